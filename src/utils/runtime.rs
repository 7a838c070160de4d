use anyhow::Result;

/// The host runs every handler on one thread. Handlers still interleave at await points, which
/// is why store updates go through [SerializedStore](crate::storage::SerializedStore).
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
