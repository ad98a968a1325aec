//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("batchSize must be at least 1");
        assert_eq!(
            err.to_string(),
            "configuration error: batchSize must be at least 1"
        );
    }

    #[test]
    fn test_walk_error_missing() {
        let err = WalkError::Missing {
            path: PathBuf::from("/mnt/nfs/global/vol1"),
        };
        assert_eq!(err.to_string(), "path '/mnt/nfs/global/vol1' does not exist");
    }

    #[test]
    fn test_walk_error_read_dir_keeps_source() {
        let err = WalkError::ReadDir {
            path: PathBuf::from("/mnt/nfs/project"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().starts_with("failed to read directory '/mnt/nfs/project'"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_measure_error_stat() {
        let err = MeasureError::Stat {
            path: PathBuf::from("/mnt/nfs/global/vol1"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to stat '/mnt/nfs/global/vol1': denied");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_measure_error_parse() {
        let err = MeasureError::Parse("missing root attribute".to_string());
        assert_eq!(
            err.to_string(),
            "failed to parse duc output: missing root attribute"
        );
    }

    #[test]
    fn test_measure_error_command_failed() {
        let err = MeasureError::CommandFailed {
            command: "duc index".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "no such file".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "'duc index' exited with exit status: 1: no such file"
        );
    }

    #[test]
    fn test_index_error_incomplete() {
        let err = IndexError::Incomplete {
            indexed: 590,
            errored: 10,
        };
        assert_eq!(err.to_string(), "indexed 590 documents with 10 errors");
    }

    #[test]
    fn test_store_error_transport() {
        let err = StoreError::transport("http://es:9200/_bulk", "connection refused");
        assert_eq!(
            err.to_string(),
            "request to http://es:9200/_bulk failed: connection refused"
        );
    }

    #[test]
    fn test_store_error_rejected() {
        let err = StoreError::Rejected {
            status: 404,
            reason: "index_not_found_exception".to_string(),
        };
        assert_eq!(err.to_string(), "[404] index_not_found_exception");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_severity() {
        let partial: Error = IndexError::Incomplete {
            indexed: 1,
            errored: 1,
        }
        .into();
        assert_eq!(partial.severity(), Severity::Partial);

        let fatal: Error = StoreError::Setup("bad tls".to_string()).into();
        assert_eq!(fatal.severity(), Severity::Fatal);
        assert_eq!(Error::config("x").severity(), Severity::Fatal);
    }

    #[test]
    fn test_error_internal() {
        let err = Error::internal("test internal error");
        assert_eq!(err.to_string(), "internal error: test internal error");
    }

    #[test]
    fn test_error_propagation_with_question_mark() {
        fn inner() -> Result<i32> {
            Err(Error::config("inner error"))
        }

        fn outer() -> Result<i32> {
            let _ = inner()?;
            Ok(0)
        }

        let result = outer();
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "configuration error: inner error"
        );
    }
}
