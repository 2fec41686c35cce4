use sha1::{Digest, Sha1};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const CHUNK: usize = 64 * 1024;

/// Stream a file from disk, returning its lowercase hex SHA-1 and byte count.
pub(crate) async fn sha1_file(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0; CHUNK];
    let mut size = 0u64;
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size += read as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"".to_vec(), "da39a3ee5e6b4b0d3255bfef95601890afd80709")]
    #[case(b"hello world".to_vec(), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed")]
    #[tokio::test]
    async fn test_sha1_file(#[case] contents: Vec<u8>, #[case] expected: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, &contents).unwrap();
        let (digest, size) = sha1_file(&path).await.unwrap();
        assert_eq!(digest, expected);
        assert_eq!(size, contents.len() as u64);
    }

    #[tokio::test]
    async fn test_larger_than_one_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let contents = vec![7u8; CHUNK * 2 + 17];
        std::fs::write(&path, &contents).unwrap();
        let (digest, size) = sha1_file(&path).await.unwrap();
        assert_eq!(digest, format!("{:x}", Sha1::digest(&contents)));
        assert_eq!(size, contents.len() as u64);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(sha1_file(&dir.path().join("nope")).await.is_err());
    }
}
