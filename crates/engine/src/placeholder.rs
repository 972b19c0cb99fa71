//! Placeholder resolution for email/SMS templates and field values.
//!
//! A template is scanned once for `{{ ... }}` tokens and every token is
//! replaced by looking its key up in a fixed precedence order:
//!
//! 1. card built-ins (`card_title`, `card.description`, ...)
//! 2. stage/pipe/form names
//! 3. `current_date` / `current_datetime`
//! 4. `form.link` (single-form shortcut)
//! 5. `form:<Form>.<field>` and `form:<Form>.link`
//! 6. card fields (`field_<key>`, `card.field.<key>`, `<key>`)
//! 7. global variables
//!
//! Because substitution is a single pass, text produced by one token is never
//! re-scanned, and a global variable can never shadow a built-in. Tokens that
//! resolve to nothing are left verbatim; resolution never fails.

use chrono::Local;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::models::{Card, Form, GlobalVariable};

/// Shown instead of a link when `{{form.link}}` is ambiguous.
pub const AMBIGUOUS_FORM_LINK: &str =
    "[Error: Multiple forms available. Use {{form:FormName.link}} syntax]";

/// Everything a template may refer to.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderContext<'a> {
    /// Card whose title, fields and form submissions are exposed.
    pub card: Option<&'a Card>,
    pub stage_name: Option<&'a str>,
    pub pipe_name: Option<&'a str>,
    pub form_name: Option<&'a str>,
    /// Overrides `{{form.link}}`; set when sending one specific form's link.
    pub form_link: Option<&'a str>,
    pub global_variables: &'a [GlobalVariable],
    /// Forms a link can be generated for.
    pub client_forms: &'a [Form],
}

/// Build the public link for filling `form_id` on behalf of `card_id`.
pub fn form_link(base_url: &str, card_id: &str, form_id: &str) -> String {
    format!("{}/form/{}/{}", base_url.trim_end_matches('/'), card_id, form_id)
}

/// One-shot resolution with default date formats.
pub fn resolve(template: &str, context: &PlaceholderContext<'_>, base_url: &str) -> String {
    PlaceholderResolver::new(base_url).resolve(template, context)
}

pub struct PlaceholderResolver {
    base_url: String,
    date_format: String,
    datetime_format: String,
    token: Regex,
}

impl PlaceholderResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        let defaults = EngineConfig::default();
        Self {
            base_url: base_url.into(),
            date_format: defaults.date_format,
            datetime_format: defaults.datetime_format,
            token: Regex::new(r"\{\{([^{}]+)\}\}").expect("Invalid regex pattern"),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            date_format: config.date_format.clone(),
            datetime_format: config.datetime_format.clone(),
            ..Self::new(config.base_url.clone())
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Substitute every resolvable token in `template`.
    pub fn resolve(&self, template: &str, ctx: &PlaceholderContext<'_>) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }
        self.token
            .replace_all(template, |caps: &Captures<'_>| {
                self.lookup(caps[1].trim(), ctx)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn lookup(&self, key: &str, ctx: &PlaceholderContext<'_>) -> Option<String> {
        match key {
            "card_title" | "card.title" => return ctx.card.map(|c| c.title.clone()),
            "card_description" | "card.description" => {
                return ctx.card.map(|c| c.description.clone().unwrap_or_default())
            }
            "stage_name" | "stage.name" => return ctx.stage_name.map(str::to_string),
            "pipe_name" | "pipe.name" => return ctx.pipe_name.map(str::to_string),
            "form_name" | "form.name" => return ctx.form_name.map(str::to_string),
            "current_date" => return Some(Local::now().format(&self.date_format).to_string()),
            "current_datetime" => {
                return Some(Local::now().format(&self.datetime_format).to_string())
            }
            "form.link" => return self.single_form_link(ctx),
            _ => {}
        }

        if let Some(reference) = key.strip_prefix("form:") {
            return self.form_reference(reference, ctx);
        }

        if let Some(card) = ctx.card {
            if let Some(field_key) = key.strip_prefix("card.field.") {
                return Some(self.field_text(card, field_key));
            }
            if let Some(field_key) = key.strip_prefix("field_") {
                if card.field(key).is_none() {
                    return Some(self.field_text(card, field_key));
                }
            }
            if let Some(field) = card.field(key) {
                return Some(self.render_value(&field.value));
            }
        }

        ctx.global_variables
            .iter()
            .find(|v| v.name == key)
            .map(|v| v.value.clone())
    }

    fn field_text(&self, card: &Card, key: &str) -> String {
        card.field(key)
            .map(|f| self.render_value(&f.value))
            .unwrap_or_default()
    }

    fn single_form_link(&self, ctx: &PlaceholderContext<'_>) -> Option<String> {
        if let Some(link) = ctx.form_link {
            return Some(link.to_string());
        }
        match ctx.client_forms {
            [] => Some(String::new()),
            [only] => ctx.card.map(|c| form_link(&self.base_url, &c.id, &only.id)),
            _ => Some(AMBIGUOUS_FORM_LINK.to_string()),
        }
    }

    /// `<FormName>.<field>` or `<FormName>.link`. Unknown forms and fields
    /// resolve to an empty string.
    fn form_reference(&self, reference: &str, ctx: &PlaceholderContext<'_>) -> Option<String> {
        let (form_name, field) = reference.split_once('.')?;
        let form_name = form_name.trim();
        let field = field.trim();

        if field == "link" {
            let link = ctx
                .client_forms
                .iter()
                .find(|f| f.name.eq_ignore_ascii_case(form_name))
                .zip(ctx.card)
                .map(|(form, card)| form_link(&self.base_url, &card.id, &form.id));
            return Some(link.unwrap_or_default());
        }

        let value = ctx
            .card
            .and_then(|card| {
                card.form_submissions
                    .iter()
                    .find(|s| s.form_name.eq_ignore_ascii_case(form_name))
            })
            .and_then(|submission| response_value(&submission.responses, field));

        Some(value.map(|v| self.render_value(v)).unwrap_or_default())
    }

    /// Render a stored value for inclusion in a message body.
    pub fn render_value(&self, value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Object(obj) if obj.contains_key("url") => self.render_file(obj),
            Value::Object(_) => value.to_string(),
            Value::Array(items) => {
                let has_files = items.iter().any(|i| i.get("url").is_some());
                let parts: Vec<String> = items
                    .iter()
                    .map(|i| self.render_value(i))
                    .filter(|s| !s.is_empty())
                    .collect();
                parts.join(if has_files { " " } else { ", " })
            }
        }
    }

    fn render_file(&self, file: &Map<String, Value>) -> String {
        let raw_url = file.get("url").and_then(Value::as_str).unwrap_or_default();
        let name = file
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .unwrap_or("file");
        let url = self.absolute_url(raw_url);

        let declared = ["type", "mime_type", "mimeType"]
            .iter()
            .find_map(|k| file.get(*k).and_then(Value::as_str))
            .map(str::to_string);
        let mime = declared.unwrap_or_else(|| {
            mime_guess::from_path(name)
                .first()
                .or_else(|| mime_guess::from_path(raw_url).first())
                .map(|m| m.essence_str().to_string())
                .unwrap_or_default()
        });

        let url = escape_html(&url);
        let name = escape_html(name);
        if mime.starts_with("image/") {
            format!(
                r#"<a href="{url}" target="_blank"><img src="{url}" alt="{name}" style="max-width:200px;max-height:200px;border-radius:4px;" /></a>"#
            )
        } else {
            format!(r#"<a href="{url}" target="_blank">📎 {name}</a>"#)
        }
    }

    fn absolute_url(&self, url: &str) -> String {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:") {
            return url.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

/// Exact key first, then case-insensitive.
fn response_value<'a>(responses: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    responses.get(field).or_else(|| {
        responses
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(field))
            .map(|(_, v)| v)
    })
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
