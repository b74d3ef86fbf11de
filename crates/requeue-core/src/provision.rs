//! Startup provisioning: make sure every stage destination exists before any
//! consumer subscribes. Failure here is fatal to the whole service.

use crate::broker::Admin;
use crate::config::Topics;
use crate::error::RequeueError;

pub async fn ensure_topics(admin: &dyn Admin, topics: &Topics) -> Result<(), RequeueError> {
    let names = topics.all();
    admin.ensure_topics(&names).await?;
    tracing::info!(?names, "topics provisioned");
    Ok(())
}
