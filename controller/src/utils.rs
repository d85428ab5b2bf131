use chrono::{DateTime, SecondsFormat, Utc};
use frappe_operator::k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use futures::future::BoxFuture;
use futures::prelude::*;

pub trait ControllerStreamExt<'a> {
    fn wait(self) -> BoxFuture<'a, ()>;
}

impl<'a, T> ControllerStreamExt<'a> for T
where
    T: Stream + Send + 'a,
{
    fn wait(self) -> BoxFuture<'a, ()> {
        self.for_each_concurrent(None, |_| futures::future::ready(()))
            .boxed()
    }
}

// Both conversions go through the RFC 3339 wire form so they do not depend on
// the datetime library backing `Time`.

pub fn to_kube_time(at: DateTime<Utc>) -> serde_json::Result<Time> {
    serde_json::from_value(serde_json::Value::String(
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
    ))
}

pub fn from_kube_time(time: &Time) -> Option<DateTime<Utc>> {
    let serde_json::Value::String(rfc3339) = serde_json::to_value(time).ok()? else {
        return None;
    };
    DateTime::parse_from_rfc3339(&rfc3339)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
