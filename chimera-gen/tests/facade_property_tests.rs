//! Property-Based Tests for the Generation Facade
//!
//! Property: for any valid request, a repeat of the same logical request
//! (including re-spaced prompts) SHALL be a cache hit returning the identical
//! artifact, and the provider SHALL be reached exactly once.

use chimera_test_utils::generators::{arb_image_params, arb_respaced, arb_text_params};
use chimera_test_utils::{png_provider, text_provider, Harness, ImageParams, ProviderTier};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// ARBITRATORS
// ============================================================================

fn arb_image_pair() -> impl Strategy<Value = (ImageParams, ImageParams)> {
    arb_image_params().prop_flat_map(|params| {
        let original = params.clone();
        arb_respaced(params.prompt.clone()).prop_map(move |prompt| {
            let mut respaced = original.clone();
            respaced.prompt = prompt;
            (original.clone(), respaced)
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn prop_repeat_image_request_is_cached((first, repeat) in arb_image_pair()) {
        runtime().block_on(async {
            let harness = Harness::new();
            let provider = png_provider("local-image", ProviderTier::Local);
            let facade = harness.image_facade(&[provider.clone()]);

            let generated = facade.generate(first).await.unwrap();
            let cached = facade.generate(repeat).await.unwrap();

            prop_assert!(!generated.cached);
            prop_assert!(cached.cached);
            prop_assert_eq!(&cached.artifact, &generated.artifact);
            prop_assert_eq!(provider.calls(), 1);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_text_identity_ignores_prompt(params in arb_text_params(), other_prompt in "[a-z]{1,20}") {
        runtime().block_on(async {
            let harness = Harness::new();
            let provider = text_provider("gemini", ProviderTier::Remote, "Once, long ago.");
            let facade = harness.text_facade(&[provider.clone()]);

            let mut reworded = params.clone();
            reworded.prompt = other_prompt;
            let generated = facade.generate(params).await.unwrap();
            let cached = facade.generate(reworded).await.unwrap();

            prop_assert!(cached.cached);
            prop_assert_eq!(&cached.artifact.fingerprint, &generated.artifact.fingerprint);
            prop_assert_eq!(provider.calls(), 1);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
