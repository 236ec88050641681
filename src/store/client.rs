// Store Client Interface - Project Maester
// "Every vault answers to the same knock"

use crate::error::MaesterResult;
use async_trait::async_trait;
use serde_json::Value;

/// Capability set required from a data store client
///
/// The adapters compose over this trait instead of any concrete client, so
/// a store can be backed by anything that speaks records and collections.
/// Implementations signal transport problems with tagged
/// `MaesterError::ConnectionError` values rather than free-form strings.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Establish the underlying connection
    async fn connect(&self) -> MaesterResult<()>;

    /// Tear down the underlying connection
    async fn disconnect(&self) -> MaesterResult<()>;

    /// Trivial round-trip used for health probing
    async fn ping(&self) -> MaesterResult<()>;

    /// Insert a record, honoring an explicit `id` field when present
    async fn create(&self, collection: &str, record: Value) -> MaesterResult<Value>;

    /// Fetch a single record by id
    async fn find_by_id(&self, collection: &str, id: i64) -> MaesterResult<Option<Value>>;

    /// Fetch all records matching an equality filter (all records when `None`)
    async fn find_many(&self, collection: &str, filter: Option<&Value>) -> MaesterResult<Vec<Value>>;

    /// Apply a partial update to a record, returning the updated record
    async fn update(&self, collection: &str, id: i64, changes: Value) -> MaesterResult<Value>;

    /// Remove a record, returning the removed record
    async fn delete(&self, collection: &str, id: i64) -> MaesterResult<Value>;
}
