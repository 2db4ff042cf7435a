#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::uploads::{UploadStore, sanitize_file_name};
    use base64::Engine;

    fn encode(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn test_file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("Aula 1 (final).mp3"), "Aula_1__final_.mp3");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\music\\track.wav"), "track.wav");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name("///"), "upload");
        assert_eq!(sanitize_file_name(&"a".repeat(300)).len(), 100);
    }

    #[rocket::async_test]
    async fn test_store_writes_under_audio_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), 1024);

        let stored = store
            .store_audio("talk.mp3", &encode(b"sound"), "audio/mpeg")
            .await
            .expect("Upload failed");

        assert!(stored.key.starts_with("audio/"));
        assert!(stored.key.ends_with("-talk.mp3"));
        assert_eq!(stored.url, format!("/uploads/{}", stored.key));
        assert_eq!(store.root(), dir.path());
        assert_eq!(std::fs::read(dir.path().join(&stored.key)).unwrap(), b"sound");
    }

    #[rocket::async_test]
    async fn test_data_url_prefix_and_video_types_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), 1024);

        let data = format!("data:video/webm;base64,{}", encode(b"webm bytes"));
        let stored = store
            .store_audio("clip.webm", &data, "video/webm")
            .await
            .expect("Upload failed");

        assert_eq!(
            std::fs::read(dir.path().join(&stored.key)).unwrap(),
            b"webm bytes"
        );
    }

    #[rocket::async_test]
    async fn test_rejects_bad_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), 8);

        let wrong_type = store.store_audio("a.pdf", &encode(b"pdf"), "application/pdf").await;
        assert!(matches!(wrong_type, Err(AppError::Validation(_))));

        let not_base64 = store.store_audio("a.mp3", "%%%", "audio/mpeg").await;
        assert!(matches!(not_base64, Err(AppError::Validation(_))));

        let empty = store.store_audio("a.mp3", "", "audio/mpeg").await;
        assert!(matches!(empty, Err(AppError::Validation(_))));

        let too_large = store
            .store_audio("a.mp3", &encode(&[0u8; 64]), "audio/mpeg")
            .await;
        assert!(matches!(too_large, Err(AppError::Validation(_))));
    }
}
