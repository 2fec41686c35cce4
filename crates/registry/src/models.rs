use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// The registry's metadata document for one package name.
///
/// Only the fields the mirror acts on are modelled; anything else in the
/// document is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePackage {
    pub name: String,
    /// Raw manifests keyed by version. Decoded one at a time through
    /// [`manifest`](Self::manifest), so one malformed manifest does not
    /// spoil the rest of the document.
    #[serde(deserialize_with = "null_as_default")]
    pub versions: BTreeMap<String, Value>,
    /// Version string to publish timestamp. Also carries the registry's
    /// bookkeeping keys (`created`, `modified`, `unpublished`), which have no
    /// manifest and are not always strings.
    #[serde(deserialize_with = "null_as_default")]
    pub time: BTreeMap<String, Value>,
    #[serde(rename = "dist-tags", deserialize_with = "string_map")]
    pub dist_tags: BTreeMap<String, String>,
    #[serde(deserialize_with = "maintainer_list")]
    pub maintainers: Vec<Maintainer>,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
}

impl SourcePackage {
    /// A document without a revision is a registry stub (e.g. an
    /// unpublished package), not a package that can be mirrored.
    pub fn exists(&self) -> bool {
        self.rev.is_some()
    }

    /// Decode the manifest of `version`. `None` when the document has no
    /// manifest for it.
    pub fn manifest(&self, version: &str) -> Option<Result<VersionDescriptor, serde_json::Error>> {
        self.versions.get(version).map(VersionDescriptor::deserialize)
    }

    /// Publish time of `version` in milliseconds since the Unix epoch.
    ///
    /// `None` when the version has no entry in the time map or the entry is
    /// not an RFC 3339 timestamp.
    pub fn publish_time(&self, version: &str) -> Option<i64> {
        self.time.get(version).and_then(Value::as_str).and_then(parse_timestamp)
    }
}

/// One version's manifest.
///
/// Unknown fields are kept in [`extra`](Self::extra) so that serialising the
/// descriptor reproduces the full source manifest. Fields old registry
/// documents got wrong (array dependencies, string maintainers, `null`
/// checksums) decode to their empty value instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, deserialize_with = "dependency_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(
        default,
        rename = "devDependencies",
        deserialize_with = "dependency_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "maintainer_list")]
    pub maintainers: Vec<Maintainer>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<Dist>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VersionDescriptor {
    /// Names of runtime dependencies followed by development dependencies.
    /// A name declared in both is yielded twice.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().chain(self.dev_dependencies.keys()).map(String::as_str)
    }

    /// Name of the first maintainer, if any.
    pub fn first_maintainer(&self) -> Option<&str> {
        self.maintainers.first().map(|m| m.name.as_str()).filter(|name| !name.is_empty())
    }
}

/// Distribution info: where the tarball lives and what it should hash to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dist {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tarball: String,
    /// Lowercase hex SHA-1 of the tarball.
    #[serde(default, deserialize_with = "null_as_default")]
    pub shasum: String,
    #[serde(default, deserialize_with = "lenient_u64", skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub noattachment: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Maintainer {
    /// Accepts `{"name", "email"}` objects and `"Name <email>"` strings.
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self {
                name: fields.get("name").and_then(Value::as_str)?.to_string(),
                email: fields.get("email").and_then(Value::as_str).map(str::to_string),
            }),
            Value::String(raw) => {
                let (name, email) = match raw.split_once('<') {
                    Some((name, rest)) => (name, rest.split_once('>').map(|(email, _)| email.trim())),
                    None => (raw.as_str(), None),
                };
                Some(Self {
                    name: name.trim().to_string(),
                    email: email.filter(|e| !e.is_empty()).map(str::to_string),
                })
            },
            _ => None,
        }
    }
}

/// Parse an RFC 3339 timestamp into milliseconds since the Unix epoch.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let parsed = OffsetDateTime::parse(raw, &Rfc3339).ok()?;
    i64::try_from(parsed.unix_timestamp_nanos() / 1_000_000).ok()
}

// The registry emits `null` for some collections on old documents.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Dependency maps. Very old manifests list bare names in an array.
fn dependency_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(entries) => entries
            .into_iter()
            .map(|(name, range)| match range {
                Value::String(range) => (name, range),
                other => (name, other.to_string()),
            })
            .collect(),
        Value::Array(names) => names
            .into_iter()
            .filter_map(|name| match name {
                Value::String(name) => Some((name, "*".to_string())),
                _ => None,
            })
            .collect(),
        _ => BTreeMap::new(),
    })
}

fn maintainer_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Maintainer>, D::Error> {
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    };
    Ok(items.into_iter().filter_map(Maintainer::from_value).collect())
}

/// Keeps string-valued entries only.
fn string_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(entries) => entries
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(value) => Some((key, value)),
                _ => None,
            })
            .collect(),
        _ => BTreeMap::new(),
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(value) => Some(value),
        _ => None,
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_u64())
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "_id": "left-pad",
            "_rev": "12-abc",
            "name": "left-pad",
            "dist-tags": { "latest": "1.1.0" },
            "maintainers": [{ "name": "alice", "email": "alice@example.com" }],
            "time": {
                "created": "2016-03-01T00:00:00.000Z",
                "1.0.0": "2016-03-01T00:00:00.000Z",
                "1.1.0": "2016-04-01T12:30:00.500Z"
            },
            "versions": {
                "1.0.0": {
                    "name": "left-pad",
                    "version": "1.0.0",
                    "dependencies": null,
                    "dist": { "tarball": "https://r.test/left-pad/-/left-pad-1.0.0.tgz", "shasum": "aa" }
                },
                "1.1.0": {
                    "name": "left-pad",
                    "version": "1.1.0",
                    "description": "String left pad",
                    "main": "index.js",
                    "dependencies": { "b": "^1.0.0" },
                    "devDependencies": { "tap": "*", "b": "^1.0.0" },
                    "maintainers": [{ "name": "bob" }],
                    "dist": {
                        "tarball": "https://r.test/left-pad/-/left-pad-1.1.0.tgz",
                        "shasum": "bb",
                        "integrity": "sha512-xyz"
                    }
                }
            }
        })
    }

    #[test]
    fn test_decode_document() {
        let package: SourcePackage = serde_json::from_value(document()).unwrap();
        assert!(package.exists());
        assert_eq!(package.dist_tags.get("latest").map(String::as_str), Some("1.1.0"));
        assert_eq!(package.versions.len(), 2);
        assert_eq!(package.time.len(), 3);

        let old = package.manifest("1.0.0").unwrap().unwrap();
        assert!(old.dependencies.is_empty());
        assert_eq!(old.first_maintainer(), None);

        let new = package.manifest("1.1.0").unwrap().unwrap();
        assert_eq!(new.dependency_names().collect::<Vec<_>>(), vec!["b", "b", "tap"]);
        assert_eq!(new.first_maintainer(), Some("bob"));
        assert_eq!(new.extra.get("main"), Some(&json!("index.js")));
    }

    #[test]
    fn test_unknown_fields_survive_serialisation() {
        let package: SourcePackage = serde_json::from_value(document()).unwrap();
        let snapshot = serde_json::to_value(package.manifest("1.1.0").unwrap().unwrap()).unwrap();
        assert_eq!(snapshot["main"], json!("index.js"));
        assert_eq!(snapshot["devDependencies"]["tap"], json!("*"));
        assert_eq!(snapshot["dist"]["integrity"], json!("sha512-xyz"));
    }

    #[test]
    fn test_missing_rev_does_not_exist() {
        let package: SourcePackage = serde_json::from_value(json!({
            "name": "gone",
            "time": { "modified": "2020-01-01T00:00:00.000Z", "unpublished": { "name": "someone" } }
        }))
        .unwrap();
        assert!(!package.exists());
        assert!(package.versions.is_empty());
    }

    #[rstest]
    #[case::array_dependencies(json!({ "dependencies": ["b", 7, "c"] }), &["b", "c"])]
    #[case::numeric_range(json!({ "dependencies": { "b": 1 } }), &["b"])]
    #[case::string_dependencies(json!({ "dependencies": "b" }), &[])]
    fn test_legacy_dependencies(#[case] manifest: Value, #[case] names: &[&str]) {
        let descriptor: VersionDescriptor = serde_json::from_value(manifest).unwrap();
        assert_eq!(descriptor.dependency_names().collect::<Vec<_>>(), names);
    }

    #[rstest]
    #[case::object(json!([{ "name": "alice", "email": "a@x.test" }]), "alice", Some("a@x.test"))]
    #[case::string_with_email(json!(["Alice Smith <a@x.test> (https://x.test)"]), "Alice Smith", Some("a@x.test"))]
    #[case::bare_string(json!("alice"), "alice", None)]
    #[case::single_object(json!({ "name": "alice" }), "alice", None)]
    fn test_legacy_maintainers(#[case] maintainers: Value, #[case] name: &str, #[case] email: Option<&str>) {
        let descriptor: VersionDescriptor = serde_json::from_value(json!({ "maintainers": maintainers })).unwrap();
        assert_eq!(descriptor.maintainers.len(), 1);
        assert_eq!(descriptor.maintainers[0].name, name);
        assert_eq!(descriptor.maintainers[0].email.as_deref(), email);
    }

    #[test]
    fn test_legacy_scalars() {
        let descriptor: VersionDescriptor = serde_json::from_value(json!({
            "version": null,
            "description": ["not", "text"],
            "dist": { "tarball": "https://r.test/a.tgz", "shasum": null, "size": "big", "noattachment": "yes" }
        }))
        .unwrap();
        assert_eq!(descriptor.version, "");
        assert_eq!(descriptor.description, None);
        let dist = descriptor.dist.unwrap();
        assert_eq!(dist.shasum, "");
        assert_eq!(dist.size, None);
        assert_eq!(dist.noattachment, None);
    }

    #[test]
    fn test_malformed_manifest_is_isolated() {
        let mut document = document();
        document["versions"]["0.0.1"] = json!({ "version": "0.0.1", "dist": "https://r.test/a.tgz" });
        document["dist-tags"]["odd"] = json!(3);
        let package: SourcePackage = serde_json::from_value(document).unwrap();
        assert!(package.manifest("0.0.1").unwrap().is_err());
        assert!(package.manifest("1.1.0").unwrap().is_ok());
        assert!(package.manifest("9.9.9").is_none());
        assert!(!package.dist_tags.contains_key("odd"));
    }

    #[rstest]
    #[case("2016-03-01T00:00:00.000Z", Some(1_456_790_400_000))]
    #[case("2016-03-01T00:00:00.250Z", Some(1_456_790_400_250))]
    #[case("2016-03-01T01:00:00+01:00", Some(1_456_790_400_000))]
    #[case("yesterday", None)]
    #[case("", None)]
    fn test_parse_timestamp(#[case] raw: &str, #[case] expected: Option<i64>) {
        assert_eq!(parse_timestamp(raw), expected);
    }

    #[test]
    fn test_publish_time() {
        let package: SourcePackage = serde_json::from_value(document()).unwrap();
        assert_eq!(package.publish_time("1.1.0"), Some(1_459_513_800_500));
        assert_eq!(package.publish_time("9.9.9"), None);
    }
}
