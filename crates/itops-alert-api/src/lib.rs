// itops-alert-api: Async HTTP clients for the services itops-alert talks to
// (search index, object directory, external RCA).

pub mod auth;
pub mod directory;
pub mod error;
pub mod rca;
pub mod search;
pub mod transport;

pub use auth::{AuthProvider, BasicAuth};
pub use directory::{DirectoryClient, ObjectType, SubgraphRequest, SubgraphResponse};
pub use error::Error;
pub use rca::RcaClient;
pub use search::SearchClient;
pub use transport::{TlsMode, TransportConfig};
