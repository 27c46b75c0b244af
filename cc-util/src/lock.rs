use super::dirs::get_service_dir;
use named_lock::{NamedLock, NamedLockGuard};

/// Take the per-service named lock. Two indexers writing the same state
/// store and undo log would corrupt both, so a second instance is refused.
pub fn acquire_service_lock(service_name: &str) -> Result<(NamedLock, NamedLockGuard), String> {
    let service_dir = get_service_dir(service_name);
    std::fs::create_dir_all(&service_dir).map_err(|e| {
        format!(
            "Cannot create service directory {}: {}",
            service_dir.display(),
            e
        )
    })?;

    let lock = NamedLock::create(&format!("ccnode_{}", service_name))
        .map_err(|e| format!("Cannot create lock for {}: {}", service_name, e))?;
    let guard = lock.try_lock().map_err(|e| {
        format!(
            "{} is already running on {}: {}",
            service_name,
            service_dir.display(),
            e
        )
    })?;

    Ok((lock, guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_instance_is_refused() {
        let (_lock, _guard) = acquire_service_lock("cc-lock-test").unwrap();
        assert!(acquire_service_lock("cc-lock-test").is_err());
    }
}
