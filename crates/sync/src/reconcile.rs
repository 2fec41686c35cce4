//! Deciding what is missing locally.
//!
//! [`reconcile`] is a pure function of the upstream document and a snapshot
//! of the catalog; it performs no I/O.

use regmirror_catalog::{TagRecord, VersionRecord};
use regmirror_registry::{SourcePackage, VersionDescriptor};
use std::collections::HashMap;

/// Version string reserved for unpublished placeholders.
const PLACEHOLDER_VERSION: &str = "next";

/// Catalog rows for one package, keyed by version.
#[derive(Debug, Clone, Default)]
pub struct ExistingVersions {
    latest: Option<VersionRecord>,
    by_version: HashMap<String, VersionRecord>,
}

impl ExistingVersions {
    /// Index rows in catalog order. The first row kept is the latest;
    /// placeholder rows are dropped.
    pub fn from_records(records: impl IntoIterator<Item = VersionRecord>) -> Self {
        let mut existing = Self::default();
        for record in records {
            if record.version == PLACEHOLDER_VERSION {
                continue;
            }
            if existing.latest.is_none() {
                existing.latest = Some(record.clone());
            }
            existing.by_version.insert(record.version.clone(), record);
        }
        existing
    }

    pub fn latest(&self) -> Option<&VersionRecord> {
        self.latest.as_ref()
    }

    pub fn get(&self, version: &str) -> Option<&VersionRecord> {
        self.by_version.get(version)
    }

    pub fn len(&self) -> usize {
        self.by_version.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_version.is_empty()
    }
}

/// Tag name to version, for tags backed by a catalog row only.
#[derive(Debug, Clone, Default)]
pub struct ExistingTags(HashMap<String, String>);

impl ExistingTags {
    pub fn from_records(records: impl IntoIterator<Item = TagRecord>) -> Self {
        Self(
            records
                .into_iter()
                .filter(|record| record.module_id.is_some())
                .map(|record| (record.tag, record.version))
                .collect(),
        )
    }

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.0.get(tag).map(String::as_str)
    }
}

/// A version queued for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Source manifest, maintainers filled in from the package if empty.
    pub descriptor: VersionDescriptor,
    /// Milliseconds since the Unix epoch.
    pub publish_time: i64,
    /// First maintainer's name, else the author already on record.
    pub author: Option<String>,
}

/// A version left out of the plan, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub version: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Ascending by publish time.
    pub missing_versions: Vec<Candidate>,
    /// `(tag, version)` pairs to write.
    pub missing_tags: Vec<(String, String)>,
    /// `(record id, description)` pairs to backfill.
    pub missing_descriptions: Vec<(i64, String)>,
    /// Versions with an unparseable publish time or an undecodable manifest.
    pub skipped: Vec<Skipped>,
}

pub fn reconcile(package: &SourcePackage, existing: &ExistingVersions, tags: &ExistingTags) -> Reconciliation {
    let mut plan = Reconciliation::default();

    for (version, raw_time) in &package.time {
        let mut descriptor = match package.manifest(version) {
            None => continue,
            Some(Ok(descriptor)) => descriptor,
            Some(Err(error)) => {
                tracing::warn!(package = %package.name, version, %error, "Skipping version with malformed manifest");
                plan.skipped.push(Skipped {
                    version: version.clone(),
                    reason: format!("malformed manifest: {error}"),
                });
                continue;
            },
        };
        let Some(dist) = descriptor.dist.clone() else {
            continue;
        };
        let Some(publish_time) = raw_time.as_str().and_then(regmirror_registry::parse_timestamp) else {
            tracing::warn!(package = %package.name, version, "Skipping version with unparseable publish time");
            plan.skipped.push(Skipped {
                version: version.clone(),
                reason: "unparseable publish time".to_string(),
            });
            continue;
        };
        let record = existing.get(version);

        if descriptor.name.is_empty() {
            descriptor.name = package.name.clone();
        }
        if descriptor.maintainers.is_empty() {
            descriptor.maintainers = package.maintainers.clone();
        }
        let author = descriptor.first_maintainer().map(str::to_string).or_else(|| record.map(|r| r.author.clone()));

        let synced = record.is_some_and(|record| {
            record.checksum == dist.shasum
                && Some(&record.author) == author.as_ref()
                && record.publish_time == publish_time
        });
        if let Some(record) = record
            && synced
        {
            if record.description.is_none()
                && let Some(description) = descriptor.description.as_ref().filter(|d| !d.is_empty())
            {
                plan.missing_descriptions.push((record.id, description.clone()));
            }
            continue;
        }

        plan.missing_versions.push(Candidate { descriptor, publish_time, author });
    }
    plan.missing_versions.sort_by_key(|candidate| candidate.publish_time);

    for (tag, version) in &package.dist_tags {
        if !version.is_empty() && tags.get(tag) != Some(version.as_str()) {
            plan.missing_tags.push((tag.clone(), version.clone()));
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use regmirror_registry::{Dist, Maintainer};
    use rstest::rstest;
    use serde_json::{Value, json};

    const T1: &str = "2020-01-01T00:00:00.000Z";
    const T1_MS: i64 = 1_577_836_800_000;
    const T2: &str = "2020-02-01T00:00:00.000Z";

    fn descriptor(version: &str, shasum: &str) -> VersionDescriptor {
        VersionDescriptor {
            name: "a".to_string(),
            version: version.to_string(),
            description: Some(format!("a at {version}")),
            dist: Some(Dist {
                tarball: format!("https://registry.test/a/-/a-{version}.tgz"),
                shasum: shasum.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn package(versions: &[(&str, &str, &str)]) -> SourcePackage {
        SourcePackage {
            name: "a".to_string(),
            versions: versions
                .iter()
                .map(|(v, _, sha)| (v.to_string(), serde_json::to_value(descriptor(v, sha)).unwrap()))
                .collect(),
            time: versions.iter().map(|(v, t, _)| (v.to_string(), json!(t))).collect(),
            maintainers: vec![Maintainer { name: "alice".to_string(), email: None }],
            rev: Some("1-a".to_string()),
            ..Default::default()
        }
    }

    fn record(id: i64, version: &str, checksum: &str, author: &str, publish_time: i64) -> VersionRecord {
        VersionRecord {
            id,
            name: "a".to_string(),
            version: version.to_string(),
            author: author.to_string(),
            description: Some("stored".to_string()),
            checksum: checksum.to_string(),
            publish_time,
            package: descriptor(version, checksum),
        }
    }

    fn tag(tag: &str, version: &str, module_id: Option<i64>) -> TagRecord {
        TagRecord {
            id: 1,
            name: "a".to_string(),
            tag: tag.to_string(),
            version: version.to_string(),
            module_id,
        }
    }

    #[test]
    fn test_everything_missing_sorted_by_publish_time() {
        // BTreeMap order would be 1.0.0 then 2.0.0; publish order is reversed.
        let source = package(&[("1.0.0", T2, "bbb"), ("2.0.0", T1, "aaa")]);
        let plan = reconcile(&source, &ExistingVersions::default(), &ExistingTags::default());
        let versions: Vec<_> = plan.missing_versions.iter().map(|c| c.descriptor.version.as_str()).collect();
        assert_eq!(versions, vec!["2.0.0", "1.0.0"]);
        assert_eq!(plan.missing_versions[0].publish_time, T1_MS);
        // Package-level maintainers fill the empty version-level list.
        assert_eq!(plan.missing_versions[0].author.as_deref(), Some("alice"));
        assert_eq!(plan.missing_versions[0].descriptor.maintainers.len(), 1);
        assert!(plan.missing_descriptions.is_empty());
    }

    #[rstest]
    #[case::all_match("aaa", "alice", T1_MS, false)]
    #[case::checksum_differs("zzz", "alice", T1_MS, true)]
    #[case::author_differs("aaa", "mallory", T1_MS, true)]
    #[case::publish_time_differs("aaa", "alice", T1_MS + 1, true)]
    fn test_sync_gate(#[case] checksum: &str, #[case] author: &str, #[case] publish_time: i64, #[case] missing: bool) {
        let source = package(&[("1.0.0", T1, "aaa")]);
        let existing = ExistingVersions::from_records([record(1, "1.0.0", checksum, author, publish_time)]);
        let plan = reconcile(&source, &existing, &ExistingTags::default());
        assert_eq!(plan.missing_versions.len(), usize::from(missing));
    }

    #[test]
    fn test_author_falls_back_to_record() {
        let mut source = package(&[("1.0.0", T1, "aaa")]);
        source.maintainers.clear();
        let existing = ExistingVersions::from_records([record(1, "1.0.0", "aaa", "bob", T1_MS)]);
        let plan = reconcile(&source, &existing, &ExistingTags::default());
        assert!(plan.missing_versions.is_empty());
    }

    #[test]
    fn test_description_backfill() {
        let source = package(&[("1.0.0", T1, "aaa")]);
        let mut stored = record(9, "1.0.0", "aaa", "alice", T1_MS);
        stored.description = None;
        let plan = reconcile(&source, &ExistingVersions::from_records([stored]), &ExistingTags::default());
        assert!(plan.missing_versions.is_empty());
        assert_eq!(plan.missing_descriptions, vec![(9, "a at 1.0.0".to_string())]);
    }

    #[test]
    fn test_no_backfill_for_unsynced_version() {
        let source = package(&[("1.0.0", T1, "aaa")]);
        let mut stored = record(9, "1.0.0", "old", "alice", T1_MS);
        stored.description = None;
        let plan = reconcile(&source, &ExistingVersions::from_records([stored]), &ExistingTags::default());
        assert_eq!(plan.missing_versions.len(), 1);
        assert!(plan.missing_descriptions.is_empty());
    }

    #[test]
    fn test_versions_without_manifest_or_dist_are_ignored() {
        let mut source = package(&[("1.0.0", T1, "aaa"), ("2.0.0", T2, "bbb")]);
        source.time.insert("created".to_string(), json!(T1));
        source.time.insert("3.0.0".to_string(), json!(T2));
        if let Some(Value::Object(manifest)) = source.versions.get_mut("2.0.0") {
            manifest.remove("dist");
        }
        let plan = reconcile(&source, &ExistingVersions::default(), &ExistingTags::default());
        let versions: Vec<_> = plan.missing_versions.iter().map(|c| c.descriptor.version.as_str()).collect();
        assert_eq!(versions, vec!["1.0.0"]);
    }

    #[test]
    fn test_unparseable_publish_time_is_skipped() {
        let source = package(&[("1.0.0", "last tuesday", "aaa"), ("2.0.0", T2, "bbb")]);
        let plan = reconcile(&source, &ExistingVersions::default(), &ExistingTags::default());
        assert_eq!(plan.missing_versions.len(), 1);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].version, "1.0.0");
        assert_eq!(plan.skipped[0].reason, "unparseable publish time");
    }

    #[test]
    fn test_malformed_manifest_is_skipped() {
        let mut source = package(&[("1.0.0", T1, "aaa"), ("2.0.0", T2, "bbb")]);
        source.versions.insert("2.0.0".to_string(), json!({ "version": "2.0.0", "dist": 42 }));
        let plan = reconcile(&source, &ExistingVersions::default(), &ExistingTags::default());
        let versions: Vec<_> = plan.missing_versions.iter().map(|c| c.descriptor.version.as_str()).collect();
        assert_eq!(versions, vec!["1.0.0"]);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].version, "2.0.0");
        assert!(plan.skipped[0].reason.starts_with("malformed manifest: "));
    }

    #[test]
    fn test_placeholder_and_latest() {
        let existing = ExistingVersions::from_records([
            record(5, "next", "x", "alice", 0),
            record(4, "2.0.0", "b", "alice", 0),
            record(3, "1.0.0", "a", "alice", 0),
        ]);
        assert_eq!(existing.len(), 2);
        assert!(existing.get("next").is_none());
        assert_eq!(existing.latest().map(|r| r.id), Some(4));
    }

    #[test]
    fn test_tags() {
        let mut source = package(&[("1.0.0", T1, "aaa"), ("2.0.0", T2, "bbb")]);
        source.dist_tags = [("latest", "2.0.0"), ("beta", "2.0.0"), ("old", "1.0.0"), ("empty", "")]
            .into_iter()
            .map(|(t, v)| (t.to_string(), v.to_string()))
            .collect();
        let tags = ExistingTags::from_records([
            tag("latest", "1.0.0", Some(1)),
            tag("old", "1.0.0", Some(1)),
            // Unbacked tags never count as present.
            tag("beta", "2.0.0", None),
        ]);
        let plan = reconcile(&source, &ExistingVersions::default(), &tags);
        let mut missing = plan.missing_tags.clone();
        missing.sort();
        assert_eq!(
            missing,
            vec![("beta".to_string(), "2.0.0".to_string()), ("latest".to_string(), "2.0.0".to_string())]
        );
    }
}
