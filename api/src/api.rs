use std::fmt::Debug;

use futures::prelude::*;
use kube::{
    Resource,
    api::{DeleteParams, Patch, PatchParams, PostParams},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{ApiListStreamExt, FilterParams, ListStream, ObjectMetaExt, ResourceNameExt, Result};

pub struct Api<T> {
    name: String,
    inner: kube::api::Api<T>,
}

/// Outcome of [`Api::get_or_create`].
#[derive(Debug)]
pub enum Ensured<T> {
    Existing(T),
    Created(T),
}

impl<T> Ensured<T> {
    #[inline]
    pub fn created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    #[inline]
    pub fn into_inner(self) -> T {
        match self {
            Self::Existing(resource) | Self::Created(resource) => resource,
        }
    }
}

impl<T> Api<T> {
    pub fn new(name: String, inner: kube::api::Api<T>) -> Self {
        Self { name, inner }
    }
}

impl<T> Api<T>
where
    T: Resource + Serialize + DeserializeOwned + Clone + Debug + Send + 'static,
{
    #[inline]
    pub fn kube(&self) -> &kube::Api<T> {
        &self.inner
    }

    #[inline]
    pub fn patch_params(&self) -> PatchParams {
        PatchParams::apply(&self.name)
    }

    #[inline]
    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.name.clone()),
            ..Default::default()
        }
    }

    /// Server-side apply of everything but `status`.
    #[tracing::instrument(level = "debug", skip(self), ret, err)]
    pub async fn patch(&self, resource: &T) -> Result<T> {
        let mut json = serde_json::to_value(resource)?;
        let Some(object) = json.as_object_mut() else {
            return Err(crate::Error::expected_json_type("object", &json));
        };
        object.remove("status");
        object.insert(
            "metadata".to_string(),
            serde_json::to_value(resource.meta().strip_system())?,
        );
        Ok(self
            .inner
            .patch(
                resource.name()?,
                &self.patch_params(),
                &Patch::Apply(&object),
            )
            .await?)
    }

    #[tracing::instrument(level = "debug", skip(self), ret, err)]
    pub async fn get(&self, name: &str) -> Result<T> {
        Ok(self.inner.get(name).await?)
    }

    #[tracing::instrument(level = "debug", skip(self), ret, err)]
    pub async fn get_opt(&self, name: &str) -> Result<Option<T>> {
        Ok(self.inner.get_opt(name).await?)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn list(&self, params: &FilterParams) -> ListStream<T> {
        self.inner.list_stream(params)
    }

    pub async fn list_all(&self, params: &FilterParams) -> Result<Vec<T>>
    where
        T: Unpin,
    {
        Ok(self
            .list(params)
            .map_ok(|item| item.item)
            .try_collect::<Vec<_>>()
            .await?)
    }

    #[tracing::instrument(level = "debug", skip(self), ret, err)]
    pub async fn create(&self, resource: &T) -> Result<T> {
        Ok(self.inner.create(&self.post_params(), resource).await?)
    }

    /// Returns the live object when it exists, otherwise creates `resource`.
    /// Losing a creation race to another writer is not an error.
    #[tracing::instrument(level = "debug", skip_all, fields(name = ?resource.meta().name), err)]
    pub async fn get_or_create(&self, resource: &T) -> Result<Ensured<T>> {
        let name = resource.name()?;
        if let Some(existing) = self.get_opt(name).await? {
            return Ok(Ensured::Existing(existing));
        }
        match self.create(resource).await {
            Ok(created) => Ok(Ensured::Created(created)),
            Err(err) if err.is_conflict() => Ok(Ensured::Existing(self.get(name).await?)),
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, resource), err)]
    pub async fn replace(&self, name: &str, resource: &T) -> Result<T> {
        Ok(self
            .inner
            .replace(name, &self.post_params(), resource)
            .await?)
    }

    /// Deletes `name`, returning `false` when it was already gone.
    #[tracing::instrument(level = "debug", skip(self), ret, err)]
    pub async fn delete_opt(&self, name: &str) -> Result<bool> {
        match self.inner.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self), ret, err)]
    pub async fn patch_json(&self, name: &str, patch: json_patch::Patch) -> Result<T> {
        Ok(self
            .inner
            .patch(name, &PatchParams::default(), &Patch::Json::<()>(patch))
            .await?)
    }

    #[tracing::instrument(level = "debug", skip(self), ret, err)]
    pub async fn patch_merge(&self, name: &str, patch: &serde_json::Value) -> Result<T> {
        Ok(self
            .inner
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    /// JSON merge patch against the status subresource. Fields absent from
    /// `status` are left untouched.
    #[tracing::instrument(level = "debug", skip(self), ret, err)]
    pub async fn patch_status_merge(&self, name: &str, status: &serde_json::Value) -> Result<T> {
        Ok(self
            .inner
            .patch_status(
                name,
                &PatchParams::default(),
                &Patch::Merge(serde_json::json!({ "status": status })),
            )
            .await?)
    }
}
