mod stub;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fictranslate::translate::deepl::DeeplProvider;
use fictranslate::translate::nllb::NllbProvider;
use fictranslate::translate::{ProviderError, RetryPolicy, TranslationProvider};
use stub::{StubRequest, StubResponse, StubServer};

fn capturing(response: StubResponse) -> (StubServer, Arc<Mutex<Vec<StubRequest>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let server = StubServer::spawn(move |req| {
        sink.lock().unwrap().push(req.clone());
        response.clone()
    });
    (server, seen)
}

#[tokio::test]
async fn deepl_sends_html_tag_handling_and_mapped_languages() {
    let (server, seen) = capturing(StubResponse::json(serde_json::json!({
        "translations": [{ "text": "<p>Olá <em>mundo</em></p>" }]
    })));
    let provider = DeeplProvider::new(Some("secret".to_owned()), server.base_url.clone()).unwrap();

    let out = provider
        .translate("<p>Hello <em>world</em></p>", "en", "pt")
        .await
        .unwrap();
    assert_eq!(out, "<p>Olá <em>mundo</em></p>");

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, "POST");
    assert_eq!(req.path(), "/v2/translate");
    assert_eq!(req.authorization.as_deref(), Some("DeepL-Auth-Key secret"));
    let body = req.json();
    assert_eq!(body["text"][0], "<p>Hello <em>world</em></p>");
    assert_eq!(body["source_lang"], "EN");
    assert_eq!(body["target_lang"], "PT-BR");
    assert_eq!(body["tag_handling"], "html");
}

#[tokio::test]
async fn deepl_456_is_quota_exceeded() {
    let server = StubServer::spawn(|_| StubResponse::status(456));
    let provider = DeeplProvider::new(Some("k".to_owned()), server.base_url.clone()).unwrap();

    let err = provider.translate("x", "en", "pt").await.unwrap_err();
    assert!(matches!(err, ProviderError::QuotaExceeded { .. }), "{err}");
}

#[tokio::test]
async fn deepl_other_failures_carry_status_and_body() {
    let server = StubServer::spawn(|_| StubResponse {
        status: 403,
        body: "wrong key".to_owned(),
        headers: Vec::new(),
    });
    let provider = DeeplProvider::new(Some("k".to_owned()), server.base_url.clone()).unwrap();

    let err = provider.translate("x", "en", "pt").await.unwrap_err();
    assert!(
        matches!(&err, ProviderError::Http { status: 403, body, .. } if body == "wrong key"),
        "{err}"
    );
    assert_eq!(err.to_string(), "DeepL error: HTTP 403: wrong key");
}

#[test]
fn providers_without_keys_are_unavailable() {
    let deepl = DeeplProvider::new(None, "http://127.0.0.1:1").unwrap();
    let blank = DeeplProvider::new(Some("  ".to_owned()), "http://127.0.0.1:1").unwrap();
    let nllb = NllbProvider::new(None, "http://127.0.0.1:1", RetryPolicy::default()).unwrap();
    assert!(!deepl.is_available());
    assert!(!blank.is_available());
    assert!(!nllb.is_available());
}

#[tokio::test]
async fn nllb_strips_markup_and_rewraps_result() {
    let (server, seen) = capturing(StubResponse::json(serde_json::json!([
        { "translation_text": "Ela disse: sim & não" }
    ])));
    let provider = NllbProvider::new(
        Some("hf".to_owned()),
        server.base_url.clone(),
        RetryPolicy::fixed(1, Duration::ZERO),
    )
    .unwrap();

    let out = provider
        .translate("<blockquote>She said: <em>yes</em> &amp; no</blockquote>", "en", "pt")
        .await
        .unwrap();
    assert_eq!(out, "<blockquote>Ela disse: sim &amp; não</blockquote>");

    let requests = seen.lock().unwrap().clone();
    let req = &requests[0];
    assert_eq!(req.path(), "/models/facebook/nllb-200-distilled-1.3B");
    assert_eq!(req.authorization.as_deref(), Some("Bearer hf"));
    let body = req.json();
    assert_eq!(body["inputs"], "She said: yes & no");
    assert_eq!(body["parameters"]["src_lang"], "eng_Latn");
    assert_eq!(body["parameters"]["tgt_lang"], "por_Latn");
}

#[tokio::test]
async fn nllb_sends_decoded_text_and_escapes_output_once() {
    let (server, seen) = {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let server = StubServer::spawn(move |req| {
            let inputs = req.json()["inputs"].clone();
            sink.lock().unwrap().push(req.clone());
            StubResponse::json(serde_json::json!([{ "translation_text": inputs }]))
        });
        (server, seen)
    };
    let provider = NllbProvider::new(
        Some("hf".to_owned()),
        server.base_url.clone(),
        RetryPolicy::fixed(1, Duration::ZERO),
    )
    .unwrap();

    let out = provider
        .translate("<p>Tom &amp; Jerry said&nbsp;hi &lt;3</p>", "en", "pt")
        .await
        .unwrap();
    assert_eq!(out, "<p>Tom &amp; Jerry said hi &lt;3</p>");

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests[0].json()["inputs"], "Tom & Jerry said hi <3");
}

#[tokio::test]
async fn nllb_missing_translation_text_falls_back_to_plain_input() {
    let server = StubServer::spawn(|_| StubResponse::json(serde_json::json!([{}])));
    let provider = NllbProvider::new(
        Some("hf".to_owned()),
        server.base_url.clone(),
        RetryPolicy::fixed(1, Duration::ZERO),
    )
    .unwrap();

    let out = provider.translate("<p>Hi <b>there</b></p>", "en", "fr").await.unwrap();
    assert_eq!(out, "<p>Hi there</p>");
}
