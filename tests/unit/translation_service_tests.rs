/*!
 * Tests for the translation service against the mock provider
 */

use std::sync::Arc;
use std::time::Duration;

use postlingo::errors::{ProviderError, TranslationError};
use postlingo::language_utils::LanguageCode;
use postlingo::providers::mock::MockProvider;
use postlingo::translation::{Chunk, ContentKind, FieldBundle, FieldName, TranslationOptions, TranslationService};

use crate::common::{beach_post, mock_service, test_config};

fn french() -> LanguageCode {
    LanguageCode::parse("fr").unwrap()
}

fn chunks(texts: &[&str]) -> Vec<Chunk> {
    texts
        .iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            index,
            content: text.to_string(),
        })
        .collect()
}

#[tokio::test]
async fn test_translateText_withFencedMarkdownReply_shouldReturnCleanHtml() {
    let provider = MockProvider::working()
        .with_responder(|_| Ok("```html\n<p>Du **sable** et du soleil.</p>\n```".to_string()));
    let service = mock_service(&provider, &test_config());

    let result = service
        .translate_text("<p>Sand and sun.</p>", &french(), ContentKind::Html)
        .await
        .unwrap();

    assert_eq!(result, "<p>Du <strong>sable</strong> et du soleil.</p>");
}

#[tokio::test]
async fn test_translateText_withPlainField_shouldStripMarkdownMarkers() {
    let provider = MockProvider::working().with_responder(|_| Ok("**Guide de la plage**\n".to_string()));
    let service = mock_service(&provider, &test_config());

    let result = service
        .translate_text("Beach Guide", &french(), ContentKind::Plain)
        .await
        .unwrap();

    assert_eq!(result, "Guide de la plage");
}

#[tokio::test]
async fn test_translateFields_withProseAroundJson_shouldParse() {
    let provider = MockProvider::working().with_responder(|_| {
        Ok("Here is the translation:\n{\"title\": \"Guide de la plage\", \"excerpt\": \"Où nager\"}\nEnjoy!".to_string())
    });
    let service = mock_service(&provider, &test_config());

    let mut bundle = FieldBundle::default();
    bundle.set(FieldName::Title, "Beach Guide");
    bundle.set(FieldName::Excerpt, "Where to swim");

    let translated = service.translate_fields(&bundle, &french()).await.unwrap();
    assert_eq!(translated.get(FieldName::Title), Some("Guide de la plage"));
    assert_eq!(translated.get(FieldName::Excerpt), Some("Où nager"));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_translateFields_withBrokenJson_shouldUseTolerantExtraction() {
    let provider = MockProvider::working().with_responder(|request| {
        if request.json_output {
            // Truncated object: title survives, excerpt is cut off
            Ok("{\"title\": \"Guide de la plage\", \"excerpt\": \"Où na".to_string())
        } else {
            Ok("Où nager".to_string())
        }
    });
    let service = mock_service(&provider, &test_config());

    let mut bundle = FieldBundle::default();
    bundle.set(FieldName::Title, "Beach Guide");
    bundle.set(FieldName::Excerpt, "Where to swim");

    let translated = service.translate_fields(&bundle, &french()).await.unwrap();
    assert_eq!(translated.get(FieldName::Title), Some("Guide de la plage"));
    assert_eq!(translated.get(FieldName::Excerpt), Some("Où nager"));
    // One structured call, one call for the missing field
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_translateFields_withWholePost_shouldTranslateEveryField() {
    let provider = MockProvider::working();
    let service = mock_service(&provider, &test_config());

    let bundle = FieldBundle::from_document(&beach_post(), true);
    let translated = service.translate_fields(&bundle, &french()).await.unwrap();

    assert_eq!(translated.len(), bundle.len());
    assert!(translated.contains(FieldName::Content));
    assert!(translated.get(FieldName::Title).unwrap().starts_with("[fr]"));
}

#[tokio::test]
async fn test_translateText_withTimeout_shouldCountAsFailedAttempt() {
    let provider = MockProvider::working().with_latency(Duration::from_millis(200));
    let mut options = TranslationOptions::from_config(&test_config()).unwrap();
    options.call_timeout = Duration::from_millis(20);
    let service = TranslationService::new(Arc::new(provider.clone()), options);

    let error = service
        .translate_text("Hello world", &french(), ContentKind::Plain)
        .await
        .unwrap_err();

    match error {
        TranslationError::RetriesExhausted { attempts, causes, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(causes.len(), 3);
            assert!(causes[0].contains("timed out"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_translateText_withAuthFailure_shouldSurfaceProviderError() {
    let provider = MockProvider::working()
        .with_responder(|_| Err(ProviderError::from_status(401, "invalid api key")));
    let service = mock_service(&provider, &test_config());

    let error = service
        .translate_text("Hello world", &french(), ContentKind::Plain)
        .await
        .unwrap_err();

    assert!(matches!(error, TranslationError::Provider(ProviderError::AuthenticationError(_))));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_translateChunks_sequentially_shouldPauseBetweenCalls() {
    let provider = MockProvider::working();
    let mut config = test_config();
    config.translation.common.pacing_delay_ms = Some(500);
    config.translation.common.max_concurrent_chunks = Some(1);
    let service = mock_service(&provider, &config);

    let started = tokio::time::Instant::now();
    let translated = service
        .translate_chunks(&chunks(&["<p>One part.</p>", "<p>Two part.</p>", "<p>Three part.</p>"]), &french())
        .await
        .unwrap();

    assert_eq!(translated.len(), 3);
    // Two pauses for three calls
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert!(started.elapsed() < Duration::from_millis(1500));
}

#[tokio::test]
async fn test_translateChunks_withTinyChunk_shouldPassItThrough() {
    let provider = MockProvider::working();
    let service = mock_service(&provider, &test_config());

    let translated = service
        .translate_chunks(&chunks(&["<p>Long enough text.</p>", " \n"]), &french())
        .await
        .unwrap();

    assert_eq!(translated[1], " \n");
    assert_eq!(provider.call_count(), 1);
}
