use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use tera::{Context, Tera, Value};

/// Messages sent when none are configured.
pub const DEFAULT_MESSAGES: &[&str] = &[
    "Update API_DOCUMENTATION.md using the supplied files without being repetitive. Assume the supplied files are correct.",
    "Enrich API_DOCUMENTATION.md using the supplied files without being repetitive. Assume the supplied files are correct.",
];

/// Variables available to every message template.
#[derive(Debug, Clone, Serialize)]
pub struct MessageContext<'a> {
    /// Batch files joined with ", "
    pub file_list: String,
    /// Read-only files joined with ", "
    pub read_list: String,
    /// Batch files
    pub files: &'a [String],
    /// Read-only context files
    pub read_only: &'a [String],
    /// 1-based batch number
    pub batch_index: usize,
    /// Number of planned batches
    pub batch_count: usize,
    /// Selected model, if any
    pub model: Option<&'a str>,
    /// Selected edit format, if any
    pub edit_format: Option<&'a str>,
    /// Estimated tokens of the batch files
    pub total_tokens: usize,
}

impl<'a> MessageContext<'a> {
    /// Builds a context with the list variables filled in.
    #[must_use]
    pub fn new(files: &'a [String], read_only: &'a [String]) -> Self {
        Self {
            file_list: files.join(", "),
            read_list: read_only.join(", "),
            files,
            read_only,
            batch_index: 1,
            batch_count: 1,
            model: None,
            edit_format: None,
            total_tokens: 0,
        }
    }
}

/// Compiled message templates.
pub struct MessageRenderer {
    tera: Tera,
    count: usize,
}

impl MessageRenderer {
    /// Compiles every message and test-renders it with a sample context.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no message is given or a message is
    /// blank, and a template error if one fails to compile or render.
    pub fn new(messages: &[String]) -> Result<Self> {
        if messages.is_empty() {
            return Err(Error::config("at least one message is required"));
        }

        let mut tera = Tera::default();
        Self::register_filters(&mut tera);

        for (i, message) in messages.iter().enumerate() {
            if message.trim().is_empty() {
                return Err(Error::config(format!("message {} is empty", i + 1)));
            }
            let name = Self::template_name(i);
            tera.add_raw_template(&name, message)
                .map_err(|e| Error::template(&name, &e))?;
        }

        let renderer = Self {
            tera,
            count: messages.len(),
        };
        renderer.validate()?;
        Ok(renderer)
    }

    /// Number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Always false; construction rejects an empty list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Renders message `index` with `context`.
    ///
    /// # Errors
    ///
    /// Returns a template error if the index is out of range or rendering
    /// fails.
    pub fn render(&self, index: usize, context: &MessageContext<'_>) -> Result<String> {
        let name = Self::template_name(index);
        let context = Context::from_serialize(context).map_err(|e| Error::template(&name, &e))?;
        self.tera
            .render(&name, &context)
            .map(|s| s.trim().to_string())
            .map_err(|e| Error::template(&name, &e))
    }

    fn validate(&self) -> Result<()> {
        let files = vec!["src/example.js".to_string()];
        let read_only = vec!["README.md".to_string()];
        let mut sample = MessageContext::new(&files, &read_only);
        sample.model = Some("sample-model");
        sample.edit_format = Some("diff");
        sample.total_tokens = 42;

        for i in 0..self.count {
            self.render(i, &sample)?;
        }
        Ok(())
    }

    fn template_name(index: usize) -> String {
        format!("message_{}", index + 1)
    }

    fn register_filters(tera: &mut Tera) {
        tera.register_filter("basename", Self::basename_filter);
    }

    /// Strips directories from a path or a list of paths.
    fn basename_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
        fn base(s: &str) -> String {
            s.rsplit('/').next().unwrap_or(s).to_string()
        }

        match value {
            Value::String(s) => Ok(Value::String(base(s))),
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|v| v.as_str().map_or_else(|| v.clone(), |s| Value::String(base(s))))
                    .collect(),
            )),
            other => Ok(other.clone()),
        }
    }
}
