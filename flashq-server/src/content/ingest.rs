//! Content versioning
//!
//! Reconciles card definitions against the stored card history. Each card
//! version is content-addressed by [`CardDefinition::content_hash`]; an
//! unchanged definition is a no-op, a changed one retires the active row and
//! appends a new active row. The whole run is one transaction.

use flashq_common::models::CardDefinition;
use flashq_common::Result;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::db::Repository;

/// Outcome counts of one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Definitions already stored with identical content
    pub unchanged: usize,
    /// Cards whose uid had no active row
    pub created: usize,
    /// Cards whose previous active row was retired
    pub replaced: usize,
}

/// Apply `entries` in order inside a single transaction
///
/// Any error rolls back the whole run.
pub async fn ingest(repo: &Repository, entries: &[CardDefinition]) -> Result<IngestReport> {
    let mut tx = repo.begin().await?;
    let mut report = IngestReport::default();

    let mut module_ids: HashMap<String, i64> = HashMap::new();
    let mut course_ids: HashMap<String, i64> = HashMap::new();

    for entry in entries {
        let hash = entry.content_hash();

        if tx.find_card_by_uid_and_hash(entry.uid, &hash).await?.is_some() {
            report.unchanged += 1;
            continue;
        }

        let module_id = match module_ids.get(&entry.module_name) {
            Some(id) => *id,
            None => {
                let module = match tx.find_module_by_name(&entry.module_name).await? {
                    Some(module) => module,
                    None => {
                        debug!(module = %entry.module_name, "Creating module");
                        tx.create_module(&entry.module_name).await?
                    }
                };
                module_ids.insert(entry.module_name.clone(), module.id);
                module.id
            }
        };

        let course_id = match course_ids.get(&entry.course_slug) {
            Some(id) => *id,
            None => {
                let course = match tx.find_course_by_slug(&entry.course_slug).await? {
                    Some(course) => course,
                    None => {
                        let name = entry.course_name.as_deref().unwrap_or(&entry.course_slug);
                        debug!(course = %entry.course_slug, "Creating course");
                        tx.create_course(&entry.course_slug, name).await?
                    }
                };
                course_ids.insert(entry.course_slug.clone(), course.id);
                course.id
            }
        };

        // Retire before insert so the one-active-per-uid index never trips
        match tx.find_active_card_by_uid(entry.uid).await? {
            Some(active) => {
                tx.deactivate_card(active.id).await?;
                debug!(uid = entry.uid, old_hash = %active.hash, new_hash = %hash, "Card content changed");
                report.replaced += 1;
            }
            None => report.created += 1,
        }

        tx.create_card(entry, &hash, module_id, course_id).await?;
    }

    tx.commit().await?;

    info!(
        unchanged = report.unchanged,
        created = report.created,
        replaced = report.replaced,
        "Ingestion complete"
    );
    Ok(report)
}
