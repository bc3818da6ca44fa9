use handlebars::Handlebars;
use serde_json::Value;

use crate::error::{NotifyError, Result};

pub const EXPIRING_TEMPLATE: &str = "expiring";
pub const CERTIFICATE_CHANGED_TEMPLATE: &str = "certificate_changed";
pub const HEARTBEAT_TEMPLATE: &str = "heartbeat";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (EXPIRING_TEMPLATE, include_str!("../templates/expiring.hbs")),
    (
        CERTIFICATE_CHANGED_TEMPLATE,
        include_str!("../templates/certificate_changed.hbs"),
    ),
    (HEARTBEAT_TEMPLATE, include_str!("../templates/heartbeat.hbs")),
];

/// Renders a named template with JSON data into HTML.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, data: &Value) -> Result<String>;
}

/// Handlebars registry preloaded with the built-in notification templates.
///
/// Templates are compiled once at construction and reused for every render.
pub struct HandlebarsRenderer {
    registry: Handlebars<'static>,
}

impl HandlebarsRenderer {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        for (name, source) in BUILTIN_TEMPLATES {
            registry
                .register_template_string(name, *source)
                .map_err(|e| NotifyError::TemplateError(format!("{name}: {e}")))?;
        }
        Ok(Self { registry })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.registry.has_template(name)
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn render(&self, name: &str, data: &Value) -> Result<String> {
        self.registry
            .render(name, data)
            .map_err(|e| NotifyError::TemplateError(format!("{name}: {e}")))
    }
}
