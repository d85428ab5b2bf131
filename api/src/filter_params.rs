use std::time::Duration;

#[derive(Default, Clone, Debug)]
pub struct FilterParams {
    pub labels: Option<String>,
    pub timeout: Option<Duration>,
}

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels(mut self, labels: impl ToString) -> Self {
        self.labels = Some(labels.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl From<&FilterParams> for kube::api::ListParams {
    fn from(params: &FilterParams) -> Self {
        let mut list_params = Self::default();
        if let Some(labels) = params.labels.as_deref() {
            list_params = list_params.labels(labels);
        }
        if let Some(timeout) = params.timeout {
            list_params = list_params.timeout(timeout.as_secs() as u32);
        }
        list_params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_list_params() {
        let params = FilterParams::new()
            .with_labels("vyogo.tech/bench=erp")
            .with_timeout(Duration::from_secs(5));
        let list_params = kube::api::ListParams::from(&params);
        assert_eq!(list_params.label_selector.as_deref(), Some("vyogo.tech/bench=erp"));
        assert_eq!(list_params.timeout, Some(5));
    }
}
