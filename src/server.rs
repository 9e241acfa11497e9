use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};

use crate::config::UiConfig;
use crate::error::{DeskError, Result};
use crate::extract::DisplayResult;
use crate::pipeline::PromptPipeline;
use crate::telemetry::TelemetrySnapshot;

/// Single-page prompt desk: one input, one submit action, one output area.
#[derive(Clone)]
pub struct DeskServer {
    state: Arc<DeskState>,
}

struct DeskState {
    pipeline: PromptPipeline,
    ui: UiConfig,
}

impl DeskServer {
    pub fn new(pipeline: PromptPipeline, ui: UiConfig) -> Self {
        Self {
            state: Arc::new(DeskState { pipeline, ui }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index).post(submit_form))
            .route("/api/prompt", post(submit_json))
            .route("/api/telemetry", get(telemetry))
            .route("/health", get(|| async { "ok" }))
            .with_state(Arc::clone(&self.state))
    }

    /// Bind `addr` and serve until `shutdown` resolves.
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "prompt desk listening");
        axum::serve(listener, self.router().into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| DeskError::Protocol(format!("server error: {err}")))?;
        tracing::info!("prompt desk stopped");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PromptRequest {
    #[serde(default)]
    prompt: String,
}

#[derive(Debug, Serialize)]
struct PromptReply {
    text: String,
    error: bool,
}

impl From<DisplayResult> for PromptReply {
    fn from(shown: DisplayResult) -> Self {
        let error = shown.is_error();
        Self {
            text: shown.into_string(),
            error,
        }
    }
}

async fn index(State(state): State<Arc<DeskState>>) -> Html<String> {
    Html(render_page(&state.ui, &state.ui.default_prompt, None))
}

async fn submit_form(
    State(state): State<Arc<DeskState>>,
    Form(req): Form<PromptRequest>,
) -> Html<String> {
    let shown = state.pipeline.submit_and_extract(&req.prompt).await;
    Html(render_page(&state.ui, &req.prompt, Some(shown.as_str())))
}

async fn submit_json(
    State(state): State<Arc<DeskState>>,
    Json(req): Json<PromptRequest>,
) -> impl IntoResponse {
    let shown = state.pipeline.submit_and_extract(&req.prompt).await;
    Json(PromptReply::from(shown))
}

/// 404 when the pipeline was built without a collector.
async fn telemetry(
    State(state): State<Arc<DeskState>>,
) -> std::result::Result<Json<TelemetrySnapshot>, StatusCode> {
    state
        .pipeline
        .telemetry()
        .map(|telemetry| Json(telemetry.snapshot()))
        .ok_or(StatusCode::NOT_FOUND)
}

fn render_page(ui: &UiConfig, prompt: &str, result: Option<&str>) -> String {
    PAGE.replace("{{TITLE}}", &html_escape(&ui.title))
        .replace("{{PLACEHOLDER}}", &html_escape(&ui.placeholder))
        .replace("{{RESULT}}", &html_escape(result.unwrap_or_default()))
        .replace("{{PROMPT}}", &html_escape(prompt))
}

fn html_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '{' => out.push_str("&#123;"),
            other => out.push(other),
        }
    }
    out
}

// Markers never survive `html_escape`, so substituted text cannot expand further.
const PAGE: &str = r#"<!doctype html>
<html>
<head>
    <meta charset="utf-8" />
    <title>{{TITLE}}</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/katex@0.16.11/dist/katex.min.css" />
    <script defer src="https://cdn.jsdelivr.net/npm/katex@0.16.11/dist/katex.min.js"></script>
    <script defer src="https://cdn.jsdelivr.net/npm/katex@0.16.11/dist/contrib/auto-render.min.js"></script>
    <script defer src="https://cdn.jsdelivr.net/npm/marked@12.0.2/marked.min.js"></script>
    <script defer src="https://cdn.jsdelivr.net/npm/dompurify@3.1.6/dist/purify.min.js"></script>
    <style>
        body { font-family: sans-serif; margin: 2rem auto; max-width: 860px; }
        textarea { width: 100%; min-height: 8rem; font-family: inherit; font-size: 1rem; }
        button { margin-top: 0.5rem; padding: 0.5rem 1.5rem; }
        .panel { border: 1px solid #ccc; padding: 1rem; margin-top: 1rem; border-radius: 8px; min-height: 4rem; }
        .panel:empty::before { content: attr(data-placeholder); color: #999; }
        .error { color: #b00020; }
        pre { white-space: pre-wrap; margin: 0; }
    </style>
</head>
<body>
    <h1>{{TITLE}}</h1>
    <form id="desk" method="post" action="/">
        <textarea id="prompt" name="prompt">{{PROMPT}}</textarea>
        <button id="submit" type="submit">Submit</button>
    </form>
    <div id="output" class="panel" data-placeholder="{{PLACEHOLDER}}"><pre id="raw">{{RESULT}}</pre></div>
    <script>
        const output = document.getElementById('output');
        function show(text, isError) {
            output.classList.toggle('error', isError);
            if (!window.marked || !window.DOMPurify || !window.renderMathInElement) {
                output.innerHTML = '';
                const pre = document.createElement('pre');
                pre.textContent = text;
                output.appendChild(pre);
                return;
            }
            const blocks = [];
            const shielded = text.replace(/\$\$([\s\S]+?)\$\$/g, (_, tex) => {
                blocks.push(tex);
                return `@@MATH${blocks.length - 1}@@`;
            });
            // Model output is untrusted: only sanitized markup reaches the DOM.
            const safe = DOMPurify.sanitize(marked.parse(shielded));
            output.innerHTML = safe.replace(/@@MATH(\d+)@@/g, (_, i) => {
                const node = document.createElement('span');
                node.textContent = `$$${blocks[Number(i)]}$$`;
                return node.innerHTML;
            });
            renderMathInElement(output, {
                delimiters: [{ left: '$$', right: '$$', display: true }],
                throwOnError: false,
            });
        }
        window.addEventListener('load', () => {
            const raw = document.getElementById('raw');
            if (raw && raw.textContent) {
                show(raw.textContent, raw.textContent.startsWith('Error: '));
            } else {
                output.innerHTML = '';
            }
        });
        document.getElementById('desk').addEventListener('submit', async (ev) => {
            ev.preventDefault();
            const button = document.getElementById('submit');
            button.disabled = true;
            output.classList.remove('error');
            output.textContent = 'Thinking...';
            try {
                const reply = await fetch('/api/prompt', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ prompt: document.getElementById('prompt').value }),
                }).then(r => r.json());
                show(reply.text, reply.error);
            } catch (err) {
                show(`Error: ${err}`, true);
            } finally {
                button.disabled = false;
            }
        });
    </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            html_escape(r#"<b>"x" & 'y'</b>"#),
            "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn prompt_markers_are_not_expanded() {
        let page = render_page(&UiConfig::default(), "{{TITLE}} <script>", Some("4"));
        assert!(page.contains(">&#123;&#123;TITLE}} &lt;script&gt;</textarea>"));
        assert!(page.contains(r#"<pre id="raw">4</pre>"#));
        assert!(page.contains("Response will appear here..."));
    }

    #[test]
    fn rendered_markdown_is_sanitized_before_insertion() {
        assert!(PAGE.contains("purify.min.js"));
        assert!(PAGE.contains("DOMPurify.sanitize(marked.parse(shielded))"));
        assert!(!PAGE.contains("innerHTML = marked.parse"));
    }
}
