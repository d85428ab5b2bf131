use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use crate::GROUP;

/// A label or annotation key under the operator's API group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrappeLabel<'a>(Cow<'a, str>);

impl<'a> FrappeLabel<'a> {
    pub fn new(name: impl ToString) -> FrappeLabel<'static> {
        FrappeLabel(Cow::Owned(name.to_string()))
    }

    pub const fn borrow(name: &'a str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl fmt::Display for FrappeLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{GROUP}/{}", self.0)
    }
}

pub const APP: FrappeLabel<'static> = FrappeLabel::borrow("app");
pub const BENCH: FrappeLabel<'static> = FrappeLabel::borrow("bench");
pub const SITE: FrappeLabel<'static> = FrappeLabel::borrow("site");
pub const COMPONENT: FrappeLabel<'static> = FrappeLabel::borrow("component");

#[derive(Clone, Debug, Default)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        let mut labels = Self::default();
        labels.0.insert(APP.to_string(), "frappe".into());
        labels
    }

    pub fn with(mut self, key: FrappeLabel<'_>, value: impl ToString) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }
}

impl From<Labels> for BTreeMap<String, String> {
    fn from(labels: Labels) -> Self {
        labels.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_keys() {
        assert_eq!(BENCH.to_string(), "vyogo.tech/bench");
        assert_eq!(FrappeLabel::new("requested-access").to_string(), "vyogo.tech/requested-access");
        let labels: BTreeMap<_, _> = Labels::new().with(COMPONENT, "nginx").into();
        assert_eq!(labels.get("vyogo.tech/app").map(String::as_str), Some("frappe"));
        assert_eq!(labels.get("vyogo.tech/component").map(String::as_str), Some("nginx"));
    }
}
