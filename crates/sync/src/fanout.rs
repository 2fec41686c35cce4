//! Concurrent catalog writes for one package, each batch joined before the
//! package is considered done.

use crate::error::chain;
use crate::log::JobLog;
use futures::future::join_all;
use regmirror_catalog::Catalog;

/// Completion counts for one fanned-out batch. Failed writes still count as
/// completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Barrier {
    pub completed: usize,
    pub failed: usize,
}

impl Barrier {
    fn from_outcomes(outcomes: impl IntoIterator<Item = bool>) -> Self {
        outcomes.into_iter().fold(Self::default(), |barrier, ok| Self {
            completed: barrier.completed + 1,
            failed: barrier.failed + usize::from(!ok),
        })
    }

    pub fn succeeded(&self) -> usize {
        self.completed - self.failed
    }
}

pub(crate) async fn save_descriptions(
    catalog: &dyn Catalog,
    log: &JobLog,
    name: &str,
    items: &[(i64, String)],
) -> Barrier {
    if items.is_empty() {
        return Barrier::default();
    }
    log.line(format!("  [{name}] saving {} descriptions", items.len())).await;
    let writes = items.iter().map(|(id, description)| async move {
        match catalog.update_description(*id, description).await {
            Ok(()) => {
                log.line(format!("    saved, id: {id}, description length: {}", description.len())).await;
                true
            },
            Err(error) => {
                let error = chain(error.frame());
                log.line(format!("    save error, id: {id}, description: {description:?}, error: {error}")).await;
                false
            },
        }
    });
    Barrier::from_outcomes(join_all(writes).await)
}

pub(crate) async fn add_tags(catalog: &dyn Catalog, log: &JobLog, name: &str, items: &[(String, String)]) -> Barrier {
    if items.is_empty() {
        return Barrier::default();
    }
    log.line(format!("  [{name}] adding {} tags", items.len())).await;
    let writes = items.iter().map(|(tag, version)| async move {
        match catalog.add_tag(name, tag, version).await {
            Ok(record) => {
                let module_id = record.module_id.map_or_else(|| "none".to_string(), |id| id.to_string());
                log.line(format!("    added tag {tag}:{version}, module_id: {module_id}")).await;
                true
            },
            Err(error) => {
                log.line(format!("    add tag error, {tag}:{version}, error: {}", chain(error.frame()))).await;
                false
            },
        }
    });
    Barrier::from_outcomes(join_all(writes).await)
}
