use kube::core::Rule;

pub fn site_name_is_hostname() -> Rule {
    Rule::new(include_str!("./site_name_is_hostname.cel"))
        .message("siteName must be a lowercase DNS hostname")
        .field_path(".spec.siteName")
}

pub fn site_bench_ref_immutable() -> Rule {
    Rule::new(include_str!("./site_bench_ref_immutable.cel"))
        .message("benchRef is immutable")
        .field_path(".spec.benchRef")
}

pub fn worker_replica_bounds(worker: &str) -> Rule {
    let message = format!("{worker} worker maxReplicas must be greater than or equal to minReplicas");
    Rule::new(include_str!("./worker_replica_bounds.cel").replace("WORKER", worker))
        .message(message.as_str())
        .field_path(format!(".spec.workerAutoscaling.{worker}.maxReplicas"))
}
