//! HTML page rendering for the interactive create/delete flows.
//!
//! Pages are rendered from a single handlebars template. A default template
//! is embedded in the binary; a custom one can be dropped into the configured
//! templates directory as `error.html.hbs`.

use crate::error::{Error, Result};
use axum::http::StatusCode;
use handlebars::Handlebars;
use serde_json::json;
use std::path::Path;
use tracing::info;

pub const ROBOTS_TXT: &str = "User-agent: *\nDisallow: /\n";

const PAGE_TEMPLATE_NAME: &str = "error.html";
const PAGE_TEMPLATE_FILE: &str = "error.html.hbs";

const DEFAULT_PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Codespace</title>
  <style>
    body { font-family: sans-serif; display: flex; justify-content: center; margin-top: 10vh; }
    .card { max-width: 28rem; padding: 2rem; border: 1px solid #ddd; border-radius: 8px; }
    .detail { color: #666; font-size: 0.9rem; }
    button { padding: 0.5rem 1.5rem; }
    footer { margin-top: 2rem; color: #999; font-size: 0.8rem; }
  </style>
</head>
<body>
  <div class="card">
    <h1>{{title}}</h1>
    <p>{{app_error}}</p>
    {{#each messages}}
    <p class="detail">{{this}}</p>
    {{/each}}
    {{#if button_text}}
    <form action="{{button_action}}" method="{{button_method}}">
      <button type="submit">{{button_text}}</button>
    </form>
    {{/if}}
    {{#if button_cancel}}
    <p><a href="{{redirect_url}}">{{button_cancel}}</a></p>
    {{/if}}
    <footer>codespace-helper {{version}}</footer>
  </div>
</body>
</html>
"#;

/// Everything a rendered page can carry.
#[derive(Debug, Default, Clone)]
pub struct PageOpts {
    pub status: u16,
    pub app_error: String,
    pub messages: Vec<String>,
    pub redirect_url: String,
    pub button_text: String,
    pub button_cancel: String,
    pub button_action: String,
    pub button_method: String,
}

impl PageOpts {
    /// Page for a surfaced operation error.
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        Self {
            status: err.status_code().as_u16(),
            app_error: err.to_string(),
            ..Self::default()
        }
    }
}

pub struct PageWriter {
    registry: Handlebars<'static>,
    version: String,
}

impl PageWriter {
    /// Build a writer, preferring a custom template from `templates_dir`.
    pub fn new(templates_dir: Option<&Path>, version: &str) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);

        let template = match templates_dir.map(|dir| dir.join(PAGE_TEMPLATE_FILE)) {
            Some(path) if path.is_file() => {
                info!("Loading page template from {}", path.display());
                std::fs::read_to_string(&path).map_err(|e| {
                    Error::TemplateError(format!("reading page template {}: {e}", path.display()))
                })?
            }
            _ => DEFAULT_PAGE_TEMPLATE.to_string(),
        };

        registry
            .register_template_string(PAGE_TEMPLATE_NAME, template)
            .map_err(|e| Error::TemplateError(format!("registering page template: {e}")))?;

        Ok(Self {
            registry,
            version: version.to_string(),
        })
    }

    /// Render a page; falls back to plain text if the template misbehaves.
    #[must_use]
    pub fn render(&self, opts: &PageOpts) -> String {
        let status = StatusCode::from_u16(opts.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let title = status.canonical_reason().unwrap_or("Codespace");

        let context = json!({
            "title": title,
            "app_error": opts.app_error,
            "messages": opts.messages,
            "redirect_url": opts.redirect_url,
            "button_text": opts.button_text,
            "button_cancel": opts.button_cancel,
            "button_action": opts.button_action,
            "button_method": opts.button_method,
            "version": self.version,
        });

        self.registry
            .render(PAGE_TEMPLATE_NAME, &context)
            .unwrap_or_else(|_| format!("{} - {}", opts.status, opts.app_error))
    }
}
