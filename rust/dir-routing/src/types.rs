use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{error::RoutingError, record::Record};

/// A reference to a record by its content identifier.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    /// String form of the record's CID
    pub cid: String,
}

impl RecordRef {
    /// A reference to the record with the given CID
    pub fn new<S: Into<String>>(cid: S) -> Self {
        RecordRef { cid: cid.into() }
    }
}

impl std::fmt::Display for RecordRef {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "{}", self.cid)
    }
}

/// Summary information about a stored record, as returned by lookups.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// String form of the record's CID
    pub cid: String,
    /// The schema version discriminator found in the record envelope
    pub schema_version: String,
}

/// A peer as reported through the routing API.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Base58 peer ID
    pub id: String,
    /// Known addresses for the peer, if any
    pub addrs: Vec<String>,
}

/// The kind of label a [RecordQuery] selects on.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum QueryKind {
    /// Matches any label
    #[default]
    Unspecified,
    /// Matches skill labels
    Skill,
    /// Matches locator labels
    Locator,
    /// Matches domain labels
    Domain,
    /// Matches module labels
    Module,
}

/// A single query term. List requests AND their terms together; search
/// requests OR them and count distinct matches.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RecordQuery {
    /// Which label namespace the term selects on
    pub kind: QueryKind,
    /// The (possibly hierarchical) value to match
    pub value: String,
}

impl RecordQuery {
    /// A query term of the given kind and value
    pub fn new<S: Into<String>>(kind: QueryKind, value: S) -> Self {
        RecordQuery {
            kind,
            value: value.into(),
        }
    }

    /// A skill query term
    pub fn skill<S: Into<String>>(value: S) -> Self {
        Self::new(QueryKind::Skill, value)
    }

    /// A domain query term
    pub fn domain<S: Into<String>>(value: S) -> Self {
        Self::new(QueryKind::Domain, value)
    }

    /// A module query term
    pub fn module<S: Into<String>>(value: S) -> Self {
        Self::new(QueryKind::Module, value)
    }

    /// A locator query term
    pub fn locator<S: Into<String>>(value: S) -> Self {
        Self::new(QueryKind::Locator, value)
    }
}

/// A request to enumerate locally-published records.
#[derive(Clone, Debug, Default)]
pub struct ListRequest {
    /// Terms a record must match, all of them; empty matches every record
    pub queries: Vec<RecordQuery>,
    /// Maximum number of records to return; 0 means unlimited
    pub limit: u32,
}

/// One locally-published record matching a [ListRequest].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListResponse {
    /// The matching record
    pub record_ref: RecordRef,
    /// Every local label of the record, in string form
    pub labels: Vec<String>,
}

/// A request to search records cached from remote peers.
#[derive(Clone, Debug, Default)]
pub struct SearchRequest {
    /// Terms scored individually; a record is returned when enough match
    pub queries: Vec<RecordQuery>,
    /// Maximum number of records to return; 0 means unlimited
    pub limit: u32,
    /// Minimum number of distinct matching terms; 0 is promoted to 1
    pub min_match_score: u32,
}

/// One remote record matching a [SearchRequest].
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResponse {
    /// The matching record
    pub record_ref: RecordRef,
    /// The peer whose announcement put the record in the cache
    pub peer: PeerInfo,
    /// The query terms that matched
    pub match_queries: Vec<RecordQuery>,
    /// Number of distinct terms that matched
    pub match_score: u32,
}

/// One provider discovered by a direct-CID network listing.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderResponse {
    /// The record being provided
    pub record_ref: RecordRef,
    /// The providing peer
    pub peer: PeerInfo,
    /// Labels extracted from the record the provider served
    pub labels: Vec<String>,
}

/// The record routing surface consumed by the rest of the server.
///
/// `list` and `search` stream their results: responses arrive on the
/// returned channel and the channel closes when iteration completes.
/// Dropping the receiver cancels the underlying producer.
#[async_trait]
pub trait RoutingApi: Send + Sync {
    /// Advertise a record locally and, when the network is reachable,
    /// announce it to peers
    async fn publish(&self, record: &Record) -> Result<(), RoutingError>;

    /// Withdraw a locally-advertised record. No network retraction is
    /// issued; provider records expire via their DHT TTL
    async fn unpublish(&self, record: &Record) -> Result<(), RoutingError>;

    /// Enumerate locally-published records matching every query term
    async fn list(&self, request: ListRequest)
        -> Result<mpsc::Receiver<ListResponse>, RoutingError>;

    /// Enumerate remotely-cached records matching at least
    /// `min_match_score` query terms
    async fn search(
        &self,
        request: SearchRequest,
    ) -> Result<mpsc::Receiver<SearchResponse>, RoutingError>;
}
