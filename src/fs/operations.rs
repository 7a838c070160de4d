use std::{io::ErrorKind, path::Path};

use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{self, AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

/// Reads a whole file under a shared lock. A missing file reads as `None`.
pub async fn read_locked(path: &Path) -> Result<Option<String>, io::Error> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    file.lock_shared()?;
    let mut contents = String::new();
    let result = file.read_to_string(&mut contents).await;
    file.unlock_async().await?;
    result?;

    Ok(Some(contents))
}

/// Opens (creating if needed) a file for a locked read-modify-write.
pub async fn open_for_update(path: &Path) -> Result<File, io::Error> {
    File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await
}

/// Reads the current contents of a file that is already locked, from the beginning.
pub async fn read_all(file: &mut File) -> Result<String, io::Error> {
    file.seek(std::io::SeekFrom::Start(0)).await?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).await?;
    Ok(contents)
}

/// Replaces the contents of a file that is already locked.
pub async fn overwrite(file: &mut File, contents: &[u8]) -> Result<(), io::Error> {
    file.set_len(0).await?;
    file.seek(std::io::SeekFrom::Start(0)).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

/// Replaces a file's contents under an exclusive lock.
pub async fn write_locked(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    let mut file = open_for_update(path).await?;
    file.lock_exclusive()?;
    let result = overwrite(&mut file, contents).await;
    file.unlock_async().await?;
    result
}
