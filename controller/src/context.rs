use std::ops::Deref;

use frappe_operator::k8s_openapi::NamespaceResourceScope;
use frappe_operator::kube::Resource;

use crate::Config;

#[derive(Clone)]
pub struct Context {
    pub client: frappe_operator::Client,
    pub config: Config,
}

impl Deref for Context {
    type Target = frappe_operator::Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl Context {
    pub fn new(client: frappe_operator::Client, config: Config) -> Self {
        Self { client, config }
    }

    /// The API a controller watches: the configured namespace, else every
    /// namespace.
    pub fn watched<T>(&self) -> frappe_operator::Api<T>
    where
        T: Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        match self.config.namespace.as_deref() {
            Some(namespace) => self.api_namespaced(namespace),
            None => self.api_global(),
        }
    }
}
