//! Cross-component scenarios: upload fallback, manifest validation and
//! resolution, idempotent anchoring and platform verification end to end.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use provenance_core::pipeline::ContentState;
use provenance_core::{
    BackoffPolicy, CancelToken, Cid, ContentHash, ContentStore, HttpUploadProvider, Identity, ManifestBuilder,
    ManifestResolver, MemoryContentStore, MemoryLedger, MockUploadProvider, OwnerKey, Pipeline,
    PlatformProof, PlatformRegistry, PlatformVerifier, ProviderConfig, ProviderError,
    Registration, RegistryClient, RegistryClientConfig, ResolverConfig, StaticProofSource,
    UploadOrchestrator, VerificationError, VerifierConfig,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
const VIDEO_ID: &str = "dQw4w9WgXcQ";
const ACCOUNT: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

fn k1() -> OwnerKey {
    OwnerKey::from_bytes(&[0x11; 32]).unwrap()
}

fn k2() -> OwnerKey {
    OwnerKey::from_bytes(&[0x22; 32]).unwrap()
}

fn identity_of(key: &OwnerKey) -> Identity {
    Identity::parse(&format!("did:ethr:{}", key.address())).unwrap()
}

fn proof_line(key: &OwnerKey, content: &[u8], age: chrono::Duration) -> String {
    let timestamp = (Utc::now() - age).timestamp();
    PlatformProof::create(ContentHash::of(content), timestamp, key)
        .unwrap()
        .to_line()
}

fn registry_client(ledger: Arc<MemoryLedger>) -> RegistryClient {
    let config = RegistryClientConfig {
        policy: BackoffPolicy::immediate(3),
        poll_interval: Duration::from_millis(10),
        ..RegistryClientConfig::default()
    };
    RegistryClient::new(ledger, config)
}

/// Pipeline with mock uploads, an in-memory ledger and manifests resolved
/// through a gateway served by `server`.
fn build_pipeline(server: &MockServer, proofs: StaticProofSource) -> (Pipeline, Arc<MemoryLedger>) {
    let uploader = UploadOrchestrator::new(BackoffPolicy::immediate(2))
        .with_provider(0, Arc::new(MockUploadProvider::default()));
    let ledger = Arc::new(MemoryLedger::new(ACCOUNT));
    let resolver = ManifestResolver::new(ResolverConfig {
        gateway_base: format!("{}/ipfs", server.uri()),
        policy: BackoffPolicy::immediate(1),
        ..ResolverConfig::default()
    })
    .unwrap();
    let verifier = PlatformVerifier::new(
        PlatformRegistry::with_defaults(),
        Arc::new(resolver),
        Arc::new(proofs),
        VerifierConfig::default(),
    );
    let pipeline = Pipeline::new(
        uploader,
        registry_client(ledger.clone()),
        verifier,
        Arc::new(MemoryContentStore::new()),
    );
    (pipeline, ledger)
}

async fn publish_on_gateway(server: &MockServer, registration: &Registration) {
    Mock::given(method("GET"))
        .and(path(format!("/ipfs/{}", registration.manifest_upload.cid)))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(registration.manifest.to_json_bytes().unwrap()),
        )
        .mount(server)
        .await;
}

#[test]
fn test_hash_is_deterministic_and_stable() {
    let content = vec![0xabu8; 4096];
    assert_eq!(ContentHash::of(&content), ContentHash::of(&vec![0xabu8; 4096]));
    assert_eq!(
        ContentHash::of(b"").to_hex(),
        "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
    );
    assert_ne!(ContentHash::of(b"a"), ContentHash::of(b"b"));
}

#[tokio::test]
async fn test_transient_failure_on_first_provider_falls_back() {
    let a = Arc::new(MockUploadProvider::new("A").fail_next(
        (0..3).map(|_| ProviderError::transient("A", "503 Service Unavailable")),
    ));
    let b = Arc::new(MockUploadProvider::new("B"));
    let orchestrator = UploadOrchestrator::new(BackoffPolicy::immediate(3))
        .with_provider(0, a.clone())
        .with_provider(1, b.clone());

    let content = b"fallback content";
    let result = orchestrator.upload(content, &CancelToken::new()).await.unwrap();

    assert_eq!(result.cid, MockUploadProvider::cid_for(content));
    assert_eq!(result.provider, "B");
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].provider, "A");
    assert!(result.failures[0].error.is_transient());
    assert_eq!(a.calls(), 3);
    assert_eq!(b.calls(), 1);
}

#[tokio::test]
async fn test_down_then_up_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/up"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"cid": "Qm123"})))
        .expect(1)
        .mount(&server)
        .await;

    let down = HttpUploadProvider::new(ProviderConfig::new("Down", format!("{}/down", server.uri()), 0)).unwrap();
    let up = HttpUploadProvider::new(ProviderConfig::new("Up", format!("{}/up", server.uri()), 1)).unwrap();
    let orchestrator = UploadOrchestrator::new(BackoffPolicy::immediate(3))
        .with_provider(0, Arc::new(down))
        .with_provider(1, Arc::new(up));

    let result = orchestrator
        .upload(&[7u8; 1024], &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(result.cid.as_str(), "Qm123");
    assert_eq!(result.provider, "Up");
    assert_eq!(result.attempts, 1);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].provider, "Down");
    assert_eq!(result.failures[0].attempts, 3);
}

#[tokio::test]
async fn test_anchoring_twice_sends_one_transaction() {
    let ledger = Arc::new(MemoryLedger::new(ACCOUNT));
    let client = registry_client(ledger.clone());
    let hash = ContentHash::of(b"anchor me");
    let identity = identity_of(&k1());
    let cancel = CancelToken::new();

    let first = client.anchor(&hash, &identity, &cancel).await.unwrap();
    let second = client.anchor(&hash, &identity, &cancel).await.unwrap();

    assert!(matches!(first, provenance_core::AnchorOutcome::Anchored(_)));
    assert!(matches!(second, provenance_core::AnchorOutcome::AlreadyAnchored(_)));
    assert_eq!(first.entry().content_hash, second.entry().content_hash);
    assert_eq!(ledger.submit_calls(), 1);
}

#[test]
fn test_recomputed_hash_mismatch_is_validation_error() {
    let manifest = ManifestBuilder::new(
        Cid::parse("bafy123").unwrap(),
        ContentHash::of(b"original bytes"),
        identity_of(&k1()),
    )
    .build();

    assert!(manifest.verify_content(b"original bytes").is_ok());
    let err = manifest.verify_content(b"tampered bytes").unwrap_err();
    assert_eq!(err.field, "content_hash");
}

#[tokio::test]
async fn test_ipfs_uri_resolves_through_gateway() {
    let server = MockServer::start().await;
    let manifest = ManifestBuilder::new(
        Cid::parse("bafy123").unwrap(),
        ContentHash::of(b"gateway content"),
        identity_of(&k1()),
    )
    .build()
    .sign(&k1())
    .unwrap();
    Mock::given(method("GET"))
        .and(path("/ipfs/bafy123"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(manifest.to_json_bytes().unwrap()))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = ManifestResolver::new(ResolverConfig {
        gateway_base: format!("{}/ipfs", server.uri()),
        ..ResolverConfig::default()
    })
    .unwrap();
    let location = resolver.resolve_location("ipfs://bafy123").unwrap();
    assert_eq!(location.as_str(), format!("{}/ipfs/bafy123", server.uri()));

    let resolved = resolver.resolve("ipfs://bafy123", &CancelToken::new()).await.unwrap();
    assert_eq!(resolved, manifest);
}

#[tokio::test]
async fn test_register_then_verify_with_controller_key() {
    let server = MockServer::start().await;
    let content = b"my original video";
    let description = format!(
        "Shot on location.\n{}\n#travel",
        proof_line(&k1(), content, chrono::Duration::minutes(5))
    );
    let (pipeline, ledger) = build_pipeline(&server, StaticProofSource::new().with_text("youtube", VIDEO_ID, description));
    let cancel = CancelToken::new();

    let registration = pipeline
        .register(content, &identity_of(&k1()), Some(&k1()), &cancel)
        .await
        .unwrap();
    assert_eq!(registration.state, ContentState::RegistryAnchored);
    assert!(!registration.already_anchored);
    assert_eq!(registration.upload.cid, MockUploadProvider::cid_for(content));
    assert!(ledger.record(&registration.anchored_hash).is_some());
    assert_eq!(
        pipeline.item_state(&registration.content_hash),
        Some(ContentState::RegistryAnchored)
    );

    let stored = pipeline
        .store()
        .get_registry_entry(&registration.anchored_hash)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.identity, identity_of(&k1()).to_string());

    publish_on_gateway(&server, &registration).await;
    let record = pipeline
        .submit_binding(VIDEO_URL, &registration.manifest_uri, &cancel)
        .await
        .unwrap();

    assert!(record.is_verified(), "{:?}", record.outcome);
    assert_eq!(record.recovered_signer, Some(k1().address()));
    assert_eq!(pipeline.binding_state(record.binding_id), Some(ContentState::Verified));
    let history = pipeline.store().verifications_for(record.binding_id).await.unwrap();
    assert_eq!(history, vec![record]);
}

#[tokio::test]
async fn test_proof_signed_by_other_key_is_rejected() {
    let server = MockServer::start().await;
    let content = b"contested video";
    let description = proof_line(&k2(), content, chrono::Duration::minutes(5));
    let (pipeline, _) = build_pipeline(&server, StaticProofSource::new().with_text("youtube", VIDEO_ID, description));
    let cancel = CancelToken::new();

    let registration = pipeline
        .register(content, &identity_of(&k1()), Some(&k1()), &cancel)
        .await
        .unwrap();
    publish_on_gateway(&server, &registration).await;

    let record = pipeline
        .submit_binding(VIDEO_URL, &registration.manifest_uri, &cancel)
        .await
        .unwrap();

    match record.failure() {
        Some(VerificationError::SignatureVerification { expected, recovered }) => {
            assert_eq!(expected, &k1().address().to_string());
            assert_eq!(recovered, &k2().address().to_string());
        }
        other => panic!("expected signature failure, got {other:?}"),
    }
    assert_eq!(
        pipeline.binding_state(record.binding_id),
        Some(ContentState::VerificationFailed)
    );
}

#[tokio::test]
async fn test_stale_proof_fails_and_reverification_appends_history() {
    let server = MockServer::start().await;
    let content = b"old video";
    let description = proof_line(&k1(), content, chrono::Duration::days(400));
    let (pipeline, _) = build_pipeline(&server, StaticProofSource::new().with_text("youtube", VIDEO_ID, description));
    let cancel = CancelToken::new();

    let registration = pipeline
        .register(content, &identity_of(&k1()), Some(&k1()), &cancel)
        .await
        .unwrap();
    publish_on_gateway(&server, &registration).await;

    let first = pipeline
        .submit_binding(VIDEO_URL, &registration.manifest_uri, &cancel)
        .await
        .unwrap();
    assert!(matches!(
        first.failure(),
        Some(VerificationError::TimestampOutOfRange { .. })
    ));

    let second = pipeline.reverify("youtube", VIDEO_ID, &cancel).await.unwrap();
    assert_eq!(second.binding_id, first.binding_id);
    let history = pipeline.store().verifications_for(first.binding_id).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_unrecognized_url_is_rejected_before_binding() {
    let server = MockServer::start().await;
    let (pipeline, _) = build_pipeline(&server, StaticProofSource::new());

    let err = pipeline
        .submit_binding("https://example.com/video/1", "ipfs://bafy123", &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, provenance_core::ProvenanceError::Parse(_)));
    assert!(pipeline
        .store()
        .get_binding("youtube", VIDEO_ID)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_verified_binding_cannot_be_reverified() {
    let server = MockServer::start().await;
    let content = b"settled video";
    let description = proof_line(&k1(), content, chrono::Duration::minutes(1));
    let (pipeline, _) = build_pipeline(&server, StaticProofSource::new().with_text("youtube", VIDEO_ID, description));
    let cancel = CancelToken::new();

    let registration = pipeline
        .register(content, &identity_of(&k1()), Some(&k1()), &cancel)
        .await
        .unwrap();
    publish_on_gateway(&server, &registration).await;
    let record = pipeline
        .submit_binding("https://youtu.be/dQw4w9WgXcQ", &registration.manifest_uri, &cancel)
        .await
        .unwrap();
    assert!(record.is_verified());

    let err = pipeline.reverify("youtube", VIDEO_ID, &cancel).await.unwrap_err();
    assert!(matches!(
        err,
        provenance_core::ProvenanceError::InvalidTransition {
            from: ContentState::Verified,
            to: ContentState::BindingSubmitted
        }
    ));
}

#[tokio::test]
async fn test_reregistering_same_content_reuses_anchor() {
    let server = MockServer::start().await;
    let (pipeline, ledger) = build_pipeline(&server, StaticProofSource::new());
    let content = b"registered twice";
    let identity = identity_of(&k1());
    let cancel = CancelToken::new();

    let first = pipeline.register(content, &identity, Some(&k1()), &cancel).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let second = pipeline.register(content, &identity, Some(&k1()), &cancel).await.unwrap();

    assert!(!first.already_anchored);
    assert!(second.already_anchored);
    assert_eq!(second.anchored_hash, first.anchored_hash);
    assert_eq!(second.manifest, first.manifest);
    assert_eq!(second.manifest_uri, first.manifest_uri);
    assert_eq!(second.state, ContentState::RegistryAnchored);
    assert_eq!(ledger.submit_calls(), 1);
}
