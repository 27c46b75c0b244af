use crate::db::StateStore;
use daemonize::Daemonize;
use std::fs::File;
use std::path::Path;

/// Delete both the state store and the undo log.
pub fn clear_db_files(data_dir: &Path) -> Result<(), String> {
    let db_dir = StateStore::get_db_dir(data_dir);
    if db_dir.exists() {
        std::fs::remove_dir_all(&db_dir).map_err(|e| {
            let msg = format!(
                "Could not delete database directory at {}: {}",
                db_dir.display(),
                e
            );
            error!("{}", msg);
            msg
        })?;
        println!("Deleted RocksDB directory at {}", db_dir.display());
    } else {
        println!("RocksDB directory does not exist at {}", db_dir.display());
    }

    Ok(())
}

pub fn daemonize_process(service_name: &str) -> Result<(), String> {
    let root_dir = cc_util::get_service_dir(service_name);
    std::fs::create_dir_all(&root_dir).map_err(|e| {
        format!(
            "Failed to create service directory {}: {}",
            root_dir.display(),
            e
        )
    })?;

    let open_null = || {
        File::open("/dev/null").map_err(|e| format!("Failed to open /dev/null: {}", e))
    };

    let pid_file = root_dir.join(format!("{}.pid", service_name));
    let daemonize = Daemonize::new()
        .pid_file(pid_file)
        .chown_pid_file(true)
        .stdout(open_null()?)
        .stderr(open_null()?)
        .working_directory(root_dir);

    daemonize.start().map_err(|e| {
        format!("Error daemonizing {} service: {}", service_name, e)
    })?;

    info!("{} service daemonized successfully", service_name);
    Ok(())
}
