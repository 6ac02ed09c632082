#![allow(dead_code)]

use std::io::Read as _;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct StubRequest {
    pub method: String,
    pub url: String,
    pub body: String,
    pub authorization: Option<String>,
}

impl StubRequest {
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl StubResponse {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            headers: vec![("Content-Type".to_owned(), "text/html; charset=utf-8".to_owned())],
        }
    }

    pub fn json(value: Value) -> Self {
        Self {
            status: 200,
            body: value.to_string(),
            headers: vec![("Content-Type".to_owned(), "application/json".to_owned())],
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            headers: Vec::new(),
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            body: String::new(),
            headers: vec![("Location".to_owned(), location.to_owned())],
        }
    }
}

/// Single-threaded HTTP stub; the handler runs on the server thread.
pub struct StubServer {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StubServer {
    pub fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&StubRequest) -> StubResponse + Send + 'static,
    {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.as_str().to_owned());
                let stub_request = StubRequest {
                    method: request.method().to_string(),
                    url: request.url().to_owned(),
                    body,
                    authorization,
                };

                let reply = handler(&stub_request);
                let mut response =
                    tiny_http::Response::from_string(reply.body).with_status_code(reply.status);
                for (name, value) in reply.headers {
                    let header = tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes())
                        .expect("valid stub header");
                    response = response.with_header(header);
                }
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A work page shaped like the archive's full-work view.
pub fn work_page(title: &str, author: &str, language: &str, blocks: &[String]) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head><title>{title} - Archive of Our Own</title></head>
  <body>
    <dl class="work meta group">
      <dt class="language">Language:</dt>
      <dd class="language">{language}</dd>
    </dl>
    <div class="preface group">
      <h2 class="title heading">{title}</h2>
      <h3 class="byline heading"><a rel="author" href="/users/{author}">{author}</a></h3>
    </div>
    <div id="chapters" role="article">
      <div class="userstuff">
{}
      </div>
    </div>
  </body>
</html>
"#,
        blocks.join("\n")
    )
}

pub fn paragraphs(n: usize) -> Vec<String> {
    (1..=n)
        .map(|i| format!("<p>Paragraph number {i} of the story.</p>"))
        .collect()
}

/// Archive stub serving one work at `/works/{work_id}`.
pub fn spawn_archive(work_id: &'static str, page: String) -> StubServer {
    StubServer::spawn(move |req| {
        if req.path() == format!("/works/{work_id}") {
            StubResponse::html(page.clone())
        } else {
            StubResponse::status(404)
        }
    })
}

/// DeepL stub that prefixes every text with `[{target}] `.
pub fn spawn_deepl_echo() -> StubServer {
    StubServer::spawn(|req| {
        if req.method != "POST" || req.path() != "/v2/translate" {
            return StubResponse::status(404);
        }
        let body = req.json();
        let text = body
            .pointer("/text/0")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let target = body
            .get("target_lang")
            .and_then(Value::as_str)
            .unwrap_or_default();
        StubResponse::json(serde_json::json!({
            "translations": [{ "detected_source_language": "EN", "text": format!("[{target}] {text}") }]
        }))
    })
}
