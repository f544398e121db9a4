//! Argument template rendering
//!
//! Upload steps are stored with argument templates such as
//! `--connstring=dev={port},baud=115200`. Each argument is rendered on its
//! own; an argument that is exactly `{extra_args}` is replaced by the
//! operator's extra arguments, which are rendered with the same values.

use std::path::Path;

use zboard_core::board::EXTRA_ARGS;

use crate::error::{FlashError, Result, Stage};

/// Values available to argument templates
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    /// Stage being rendered, for error reporting
    pub stage: Stage,
    /// Build directory of the stage
    pub build_dir: &'a Path,
    /// Image of the stage
    pub image: &'a Path,
    /// Serial port of the device, if known
    pub port: Option<&'a str>,
    /// Operator-supplied extra arguments
    pub extra_args: &'a [String],
}

impl TemplateContext<'_> {
    fn value(&self, name: &str, template: &str) -> Result<String> {
        match name {
            "build_dir" => Ok(self.build_dir.display().to_string()),
            "image" => Ok(self.image.display().to_string()),
            "port" => self
                .port
                .map(str::to_string)
                .ok_or(FlashError::MissingPort { stage: self.stage }),
            _ => Err(FlashError::Template {
                template: template.to_string(),
                message: format!("unknown placeholder '{{{}}}'", name),
            }),
        }
    }
}

/// Render one argument template
pub fn render(template: &str, ctx: &TemplateContext<'_>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&ctx.value(&after[..end], template)?);
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated brace, keep the text as is
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Render a list of argument templates, splicing in the extra arguments
pub fn render_args(templates: &[String], ctx: &TemplateContext<'_>) -> Result<Vec<String>> {
    let mut args = Vec::with_capacity(templates.len() + ctx.extra_args.len());
    for template in templates {
        if template == EXTRA_ARGS {
            for extra in ctx.extra_args {
                if extra == EXTRA_ARGS {
                    return Err(FlashError::Template {
                        template: extra.clone(),
                        message: "extra arguments cannot contain {extra_args}".to_string(),
                    });
                }
                args.push(render(extra, ctx)?);
            }
        } else {
            args.push(render(template, ctx)?);
        }
    }
    Ok(args)
}

/// Check whether a list of templates refers to the serial port
pub fn uses_port(templates: &[String], extra_args: &[String]) -> bool {
    templates.iter().any(|t| {
        if t == EXTRA_ARGS {
            extra_args.iter().any(|e| e.contains("{port}"))
        } else {
            t.contains("{port}")
        }
    })
}
