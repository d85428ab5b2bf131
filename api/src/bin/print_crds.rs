use std::io::stdout;

use frappe_operator::all_crds;
use k8s_openapi::List;

fn main() -> serde_json::Result<()> {
    serde_json::to_writer_pretty(
        stdout(),
        &List {
            items: all_crds(),
            ..Default::default()
        },
    )
}
