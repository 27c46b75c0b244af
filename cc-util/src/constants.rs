
// Service names
pub const CC_INDEXER_SERVICE_NAME: &str = "cc-indexer";

// Directory constants
pub const CCNODE_ROOT_DIR: &str = ".ccnode";

// Service http ports
pub const CC_INDEXER_SERVICE_HTTP_PORT: u16 = 8099;
