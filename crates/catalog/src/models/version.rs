use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use regmirror_registry::VersionDescriptor;

/// A mirrored version as stored in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: Option<String>,
    /// Lowercase hex SHA-1 of the tarball, as declared upstream.
    pub checksum: String,
    /// Milliseconds since the Unix epoch.
    pub publish_time: i64,
    /// Manifest snapshot, `dist` pointing at the re-hosted tarball.
    pub package: VersionDescriptor,
}

/// A version about to be written to the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: Option<String>,
    pub checksum: String,
    pub publish_time: i64,
    pub package: VersionDescriptor,
}

#[derive(sqlx::FromRow)]
pub(crate) struct VersionRow {
    id: i64,
    name: String,
    version: String,
    author: String,
    description: Option<String>,
    checksum: String,
    publish_time: i64,
    package: String,
}
impl TryFrom<VersionRow> for VersionRecord {
    type Error = Error;
    fn try_from(row: VersionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            version: row.version,
            author: row.author,
            description: row.description,
            checksum: row.checksum,
            publish_time: row.publish_time,
            package: serde_json::from_str(&row.package).or_raise(|| ErrorKind::InvalidData("package snapshot"))?,
        })
    }
}

/// Bind-ready form of a [`NewVersion`]; the snapshot is serialised up front
/// so a bad manifest fails before touching the database.
pub(crate) struct NewVersionRow<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub author: &'a str,
    pub description: Option<&'a str>,
    pub checksum: &'a str,
    pub publish_time: i64,
    pub package: String,
}
impl<'a> TryFrom<&'a NewVersion> for NewVersionRow<'a> {
    type Error = Error;
    fn try_from(version: &'a NewVersion) -> Result<Self, Self::Error> {
        if version.name.is_empty() {
            exn::bail!(ErrorKind::InvalidData("name"));
        }
        if version.version.is_empty() {
            exn::bail!(ErrorKind::InvalidData("version"));
        }
        Ok(Self {
            name: &version.name,
            version: &version.version,
            author: &version.author,
            description: version.description.as_deref(),
            checksum: &version.checksum,
            publish_time: version.publish_time,
            package: serde_json::to_string(&version.package).or_raise(|| ErrorKind::InvalidData("package snapshot"))?,
        })
    }
}
