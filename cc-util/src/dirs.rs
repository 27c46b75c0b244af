use super::constants::CCNODE_ROOT_DIR;

pub fn get_ccnode_root_dir() -> std::path::PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(CCNODE_ROOT_DIR)
    } else {
        std::path::PathBuf::from(".").join(CCNODE_ROOT_DIR)
    }
}

pub fn get_service_dir(service_name: &str) -> std::path::PathBuf {
    get_ccnode_root_dir().join(service_name)
}

pub fn get_service_log_dir(service_name: &str) -> std::path::PathBuf {
    get_service_dir(service_name).join("logs")
}
