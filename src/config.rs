use std::os::raw::c_int;

use serde::{Deserialize, Serialize};

use crate::errors::{JsonnetError, Result};

/// How the formatter writes string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringStyle {
    Double,
    Single,
    Leave,
}

impl StringStyle {
    pub(crate) fn as_c(self) -> c_int {
        match self {
            StringStyle::Double => b'd' as c_int,
            StringStyle::Single => b's' as c_int,
            StringStyle::Leave => b'l' as c_int,
        }
    }
}

/// How the formatter writes line comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStyle {
    Hash,
    Slash,
    Leave,
}

impl CommentStyle {
    pub(crate) fn as_c(self) -> c_int {
        match self {
            CommentStyle::Hash => b'h' as c_int,
            CommentStyle::Slash => b's' as c_int,
            CommentStyle::Leave => b'l' as c_int,
        }
    }
}

/// Engine knobs retained on a `Context`. `None` leaves the engine default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Maximum evaluation stack depth; exceeding it is an evaluation error.
    pub max_stack: Option<u32>,
    /// Maximum number of frames rendered in an error trace.
    pub max_trace: Option<u32>,
    pub gc_min_objects: Option<u32>,
    pub gc_growth_trigger: Option<f64>,
    /// Emit a top-level string's raw content instead of JSON.
    pub string_output: Option<bool>,

    pub format_indent: Option<u32>,
    pub format_max_blank_lines: Option<u32>,
    pub format_string_style: Option<StringStyle>,
    pub format_comment_style: Option<CommentStyle>,
    pub format_pad_arrays: Option<bool>,
    pub format_pad_objects: Option<bool>,
    pub format_pretty_field_names: Option<bool>,
    pub format_sort_imports: Option<bool>,
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Config = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_stack == Some(0) {
            return Err(JsonnetError::Config("max_stack must be at least 1".into()));
        }
        if let Some(g) = self.gc_growth_trigger {
            if !g.is_finite() || g <= 0.0 {
                return Err(JsonnetError::Config(format!(
                    "gc_growth_trigger must be a positive finite number, got {g}"
                )));
            }
        }
        for (field, v) in [
            ("format_indent", self.format_indent),
            ("format_max_blank_lines", self.format_max_blank_lines),
        ] {
            if v.is_some_and(|n| n > i32::MAX as u32) {
                return Err(JsonnetError::Config(format!("{field} is out of range")));
            }
        }
        Ok(())
    }

    /// Overlays every field set in `other` onto `self`.
    pub fn merge(&mut self, other: &Config) {
        macro_rules! take {
            ($($f:ident),*) => { $( if other.$f.is_some() { self.$f = other.$f; } )* };
        }
        take!(
            max_stack,
            max_trace,
            gc_min_objects,
            gc_growth_trigger,
            string_output,
            format_indent,
            format_max_blank_lines,
            format_string_style,
            format_comment_style,
            format_pad_arrays,
            format_pad_objects,
            format_pretty_field_names,
            format_sort_imports
        );
    }
}
