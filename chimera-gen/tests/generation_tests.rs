//! End-to-end generation through the facade with in-memory collaborators.

use chimera_core::{ArtifactContent, ChimeraError, Fingerprint, GenerationError, RequestStatus};
use chimera_gen::{Collaborators, GenerationRequest, GenerationService, ImageStrategy, TextStrategy};
use chimera_storage::CacheStore;
use chimera_test_utils::assertions::{assert_generated_by, assert_generation_error, assert_placeholder};
use chimera_test_utils::fixtures::{banner_params, narration_params, portrait_params, style_bundle};
use chimera_test_utils::{
    failing_provider, png_provider, text_provider, GenerationConfig, Harness, ProviderTier,
    TextParams, TextType, UnavailableCache, UnavailableLedger,
};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// CACHE
// ============================================================================

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let harness = Harness::new();
    let provider = png_provider("local-image", ProviderTier::Local);
    let facade = harness.image_facade(&[provider.clone()]);

    let first = facade.generate(banner_params("castle at dusk")).await.unwrap();
    assert_generated_by(&first, "local-image");
    let key = format!("images/location_banner/{}.png", first.artifact.fingerprint.as_str());
    assert_eq!(first.artifact.content.reference(), Some(format!("memory://{}", key).as_str()));
    assert_eq!(harness.blobs.content_type(&key).as_deref(), Some("image/png"));

    // Whitespace differences normalize to the same fingerprint.
    let second = facade.generate(banner_params("  castle   at dusk ")).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.artifact, first.artifact);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_expired_artifact_is_regenerated() {
    let harness = Harness::new()
        .with_config(GenerationConfig::development().with_artifact_ttl(Duration::from_secs(60)));
    let provider = text_provider("local-text", ProviderTier::Local, "Rain on stone.");
    let facade = harness.text_facade(&[provider.clone()]);

    let first = facade.generate(narration_params("courtyard:1", "Courtyard")).await.unwrap();
    assert_eq!(
        first.artifact.expires_at,
        first.artifact.created_at + chrono::Duration::seconds(60)
    );

    harness.clock.advance(Duration::from_secs(61));
    let second = facade.generate(narration_params("courtyard:1", "Courtyard")).await.unwrap();

    assert!(!second.cached);
    assert_ne!(second.artifact.id, first.artifact.id);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_cache_outage_still_returns_artifact() {
    let harness = Harness::new();
    let provider = text_provider("local-text", ProviderTier::Local, "Embers glow.");
    let deps = Collaborators::new(
        Arc::new(UnavailableCache),
        harness.ledger.clone(),
        harness.styles.clone(),
    )
    .with_clock(harness.clock.clone());
    let facade = harness.facade(TextStrategy, deps, &[provider.clone()]);

    let first = facade.generate(narration_params("hearth:1", "Hearth")).await.unwrap();
    let second = facade.generate(narration_params("hearth:1", "Hearth")).await.unwrap();

    assert_generated_by(&first, "local-text");
    assert_generated_by(&second, "local-text");
    assert_eq!(provider.calls(), 2);
    assert_eq!(harness.ledger.in_flight_count(), 0);
}

// ============================================================================
// FALLBACK
// ============================================================================

#[tokio::test]
async fn test_falls_back_to_next_provider_and_logs_event() {
    let harness = Harness::new();
    let local = failing_provider("local-image", ProviderTier::Local);
    let remote = png_provider("pollinations", ProviderTier::Remote);
    let facade = harness.image_facade(&[local.clone(), remote.clone()]);

    let outcome = facade.generate(banner_params("sunken temple")).await.unwrap();

    assert_generated_by(&outcome, "pollinations");
    assert_eq!(outcome.artifact.metadata.failed_providers, vec!["local-image"]);
    assert_eq!((local.calls(), remote.calls()), (1, 1));

    let events = harness.fallback_log.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].from_provider, "local-image");
    assert_eq!(events[0].to_provider.as_deref(), Some("pollinations"));
    assert!(events[0].reason.contains("503"));
}

#[tokio::test]
async fn test_quest_text_tries_remote_first() {
    let harness = Harness::new();
    let local = text_provider("local-text", ProviderTier::Local, "local prose");
    let remote = text_provider("gemini", ProviderTier::Remote, "remote prose");
    let facade = harness.text_facade(&[local.clone(), remote.clone()]);

    let quest = facade
        .generate(TextParams::new("quest:7", TextType::QuestText, "Find the relic"))
        .await
        .unwrap();
    assert_generated_by(&quest, "gemini");

    let narration = facade.generate(narration_params("scene:1", "Dawn breaks")).await.unwrap();
    assert_generated_by(&narration, "local-text");
    assert_eq!((local.calls(), remote.calls()), (1, 1));
}

// ============================================================================
// FAILURE
// ============================================================================

#[tokio::test]
async fn test_image_failure_degrades_to_placeholder() {
    let harness = Harness::new();
    let local = failing_provider("local-image", ProviderTier::Local);
    let remote = failing_provider("pollinations", ProviderTier::Remote);
    let facade = harness.image_facade(&[local.clone(), remote.clone()]);

    let outcome = facade.generate(portrait_params("elf ranger")).await.unwrap();

    assert_placeholder(&outcome);
    assert_eq!(outcome.artifact.expires_at, outcome.artifact.created_at);
    let ArtifactContent::Inline { content_type, data } = &outcome.artifact.content else {
        unreachable!()
    };
    assert_eq!(content_type, "image/svg+xml");
    assert!(data.contains("512"));

    // Never cached, and the slot is released as failed.
    assert!(harness
        .cache
        .get(&outcome.artifact.fingerprint)
        .await
        .unwrap()
        .is_none());
    let records = harness.ledger.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RequestStatus::Failed);

    // The next request tries the providers again.
    facade.generate(portrait_params("elf ranger")).await.unwrap();
    assert_eq!((local.calls(), remote.calls()), (2, 2));
}

#[tokio::test]
async fn test_text_failure_surfaces_error() {
    let harness = Harness::new();
    let local = failing_provider("local-text", ProviderTier::Local);
    let facade = harness.text_facade(&[local]);

    let result = facade.generate(narration_params("scene:2", "The storm breaks")).await;

    assert!(matches!(
        result,
        Err(ChimeraError::Generation(GenerationError::AllProvidersFailed { ref attempted, .. }))
            if attempted == &vec!["local-text".to_string()]
    ));
    assert_eq!(harness.ledger.in_flight_count(), 0);
    assert_eq!(harness.ledger.records()[0].status, RequestStatus::Failed);
}

#[tokio::test]
async fn test_no_providers_configured() {
    let harness = Harness::new();

    let text = harness.text_facade(&[]).generate(narration_params("scene:3", "Silence")).await;
    assert_generation_error(&text);

    let image = harness.image_facade(&[]).generate(banner_params("Silence")).await.unwrap();
    assert_placeholder(&image);
}

#[tokio::test]
async fn test_invalid_request_touches_nothing() {
    let harness = Harness::new();
    let provider = text_provider("local-text", ProviderTier::Local, "unused");
    let facade = harness.text_facade(&[provider.clone()]);

    let result = facade.generate(narration_params("scene:4", "   ")).await;

    assert!(matches!(
        result,
        Err(ChimeraError::Generation(GenerationError::InvalidRequest { .. }))
    ));
    assert_eq!(provider.calls(), 0);
    assert!(harness.ledger.records().is_empty());
}

#[tokio::test]
async fn test_ledger_outage_generates_without_coordination() {
    let harness = Harness::new();
    let provider = png_provider("local-image", ProviderTier::Local);
    let deps = Collaborators::new(
        harness.cache.clone(),
        Arc::new(UnavailableLedger),
        harness.styles.clone(),
    )
    .with_clock(harness.clock.clone());
    let facade = harness.facade(ImageStrategy::new(harness.blobs.clone()), deps, &[provider.clone()]);

    let outcome = facade.generate(banner_params("watchtower")).await.unwrap();
    assert_generated_by(&outcome, "local-image");

    // The artifact still reached the cache.
    let again = facade.generate(banner_params("watchtower")).await.unwrap();
    assert!(again.cached);
    assert_eq!(provider.calls(), 1);
}

// ============================================================================
// STYLE
// ============================================================================

#[tokio::test]
async fn test_active_style_shapes_prompt_and_metadata() {
    let harness = Harness::new();
    let v1 = harness
        .styles
        .create_version("v1", None, style_bundle("watercolor"))
        .await
        .unwrap();
    let v2 = harness
        .styles
        .create_version("v2", Some("grim".to_string()), style_bundle("charcoal sketch"))
        .await
        .unwrap();
    harness.styles.set_active(v1.id).await.unwrap();
    harness.styles.set_active(v2.id).await.unwrap();
    harness.styles.verify_exclusive().await.unwrap();

    let active = harness.styles.get_active().await;
    assert_eq!(active.version_id, Some(v2.id));

    let provider = png_provider("local-image", ProviderTier::Local);
    let facade = harness.image_facade(&[provider.clone()]);
    let outcome = facade.generate(banner_params("harbor")).await.unwrap();

    assert_eq!(outcome.artifact.metadata.style_version_id, Some(v2.id));
    let prompts = provider.prompts();
    assert!(prompts[0].starts_with("charcoal sketch"));
    assert!(prompts[0].contains("harbor"));
}

#[tokio::test]
async fn test_builtin_style_when_none_active() {
    let harness = Harness::new();
    let provider = png_provider("local-image", ProviderTier::Local);
    let facade = harness.image_facade(&[provider.clone()]);

    let outcome = facade.generate(banner_params("harbor")).await.unwrap();

    assert_eq!(outcome.artifact.metadata.style_version_id, None);
    assert!(provider.prompts()[0].starts_with("High quality fantasy digital art"));
}

// ============================================================================
// SERVICE
// ============================================================================

#[tokio::test]
async fn test_service_dispatches_by_kind() {
    let harness = Harness::new();
    let image = png_provider("local-image", ProviderTier::Local);
    let text = text_provider("local-text", ProviderTier::Local, "A crow watches.");
    let service = GenerationService::new(
        harness.image_facade(&[image.clone()]),
        harness.text_facade(&[text.clone()]),
    );

    let request = GenerationRequest::from(narration_params("hill:gallows", "Gallows hill"));
    assert_eq!(request.kind(), chimera_core::ArtifactKind::Text);
    let narration = service.generate(request).await.unwrap();
    let banner = service.generate(banner_params("Gallows hill").into()).await.unwrap();

    assert_eq!(narration.artifact.content.as_text(), Some("A crow watches."));
    assert!(banner.artifact.content.reference().is_some());
    // Same prompt, different kinds: distinct fingerprints.
    assert_ne!(narration.artifact.fingerprint, banner.artifact.fingerprint);
    assert_eq!((image.calls(), text.calls()), (1, 1));
}

#[tokio::test]
async fn test_stored_fingerprint_is_hex_digest() {
    let harness = Harness::new();
    let facade = harness.text_facade(&[text_provider("local-text", ProviderTier::Local, "ok")]);

    let outcome = facade.generate(narration_params("ferry:1", "Ferry crossing")).await.unwrap();
    let fingerprint: &Fingerprint = &outcome.artifact.fingerprint;

    assert_eq!(fingerprint.as_str().len(), 64);
    assert!(fingerprint.as_str().chars().all(|c| c.is_ascii_hexdigit()));
}
