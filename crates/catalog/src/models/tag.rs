/// A dist-tag as stored in the catalog.
///
/// `module_id` is `None` when the tagged version has no catalog row; such a
/// tag is not backed by anything that can be served.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TagRecord {
    pub id: i64,
    pub name: String,
    pub tag: String,
    pub version: String,
    pub module_id: Option<i64>,
}
