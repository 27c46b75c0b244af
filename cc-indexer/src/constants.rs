use bitcoincore_rpc::bitcoin::Network;

// First blocks that can carry colored coins transactions
pub const MAINNET_FIRST_COLORED_BLOCK: u32 = 364548;
pub const TESTNET_FIRST_COLORED_BLOCK: u32 = 462320;

// Block height tag of holdings produced by unconfirmed transactions
pub const MEMPOOL_BLOCK_HEIGHT: i64 = -1;

// Database directory names
pub const DB_DIR: &str = "db";
pub const STATE_DB_NAME: &str = "state";
pub const UNDO_DB_NAME: &str = "undo";

pub fn first_colored_block(network: Network) -> u32 {
    match network {
        Network::Bitcoin => MAINNET_FIRST_COLORED_BLOCK,
        Network::Testnet => TESTNET_FIRST_COLORED_BLOCK,
        _ => 0,
    }
}
