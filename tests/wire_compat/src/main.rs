fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use chunkdrop_protocol::{
        ChunkKey, FileHash, MergeRequest, MergeResponse, VerifyRequest, VerifyResponse,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture, re-serializes it and compares the JSON values.
    /// Returns the parsed value for further assertions.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  Rust:    {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_verify_request() {
        let req = roundtrip_test::<VerifyRequest>("verify_request.json");
        assert_eq!(req.filename, "holiday.mp4");
        FileHash::parse(req.file_hash).unwrap();
    }

    #[test]
    fn fixture_verify_response_resume() {
        let resp = roundtrip_test::<VerifyResponse>("verify_response_resume.json");
        assert!(resp.should_upload);

        let indices: Vec<u64> = resp
            .uploaded_list
            .unwrap()
            .iter()
            .map(|name| ChunkKey::parse(name).unwrap().index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn fixture_verify_response_empty() {
        let resp = roundtrip_test::<VerifyResponse>("verify_response_empty.json");
        assert_eq!(resp, VerifyResponse::resume(Vec::new()));
    }

    #[test]
    fn fixture_verify_response_complete() {
        let resp = roundtrip_test::<VerifyResponse>("verify_response_complete.json");
        assert_eq!(resp, VerifyResponse::complete());
    }

    #[test]
    fn fixture_merge_request() {
        let req = roundtrip_test::<MergeRequest>("merge_request.json");
        assert_eq!(req.size, 10 * 1024 * 1024);
        assert_eq!(req.chunk_count, None);
    }

    #[test]
    fn fixture_merge_request_chunk_count() {
        let req = roundtrip_test::<MergeRequest>("merge_request_chunk_count.json");
        assert_eq!(req.chunk_count, Some(13));
    }

    #[test]
    fn fixture_merge_response_success() {
        let resp = roundtrip_test::<MergeResponse>("merge_response_success.json");
        assert_eq!(resp, MergeResponse::success());
    }

    #[test]
    fn fixture_merge_response_failure() {
        let resp = roundtrip_test::<MergeResponse>("merge_response_failure.json");
        assert!(!resp.is_success());
        assert_eq!(resp, MergeResponse::failure("missing chunk 4"));
    }

    #[test]
    fn chunk_names_match_fixture_hash() {
        let req: VerifyRequest = serde_json::from_value(load_fixture("verify_request.json")).unwrap();
        let key = ChunkKey::new(7, FileHash::parse(req.file_hash.clone()).unwrap());
        assert_eq!(key.name(), format!("7-{}", req.file_hash));
    }
}
