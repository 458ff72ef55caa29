//! Stylesheet post-processing chain
//!
//! Runs after rendering: px → rpx conversion first, then vendor prefixing
//! for the configured browser range.

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::StylesConfig;

/// One stage of the chain. Errors are plain messages; the caller attaches
/// the file they belong to.
pub trait PostProcess: Send + Sync {
    fn name(&self) -> &'static str;
    fn process(&self, css: &str) -> Result<String, String>;
}

/// A `property: value;` pair. Selectors never end in `;` or `}`. Quoted
/// strings and `url(...)` are taken whole, so a `;` inside a data URI does
/// not end the value.
static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([\w-]+\s*:\s*)((?:"[^"]*"|'[^']*'|url\([^)]*\)|[^;{}"'])+)([;}])"#)
        .expect("valid regex")
});

/// A px length, or an opaque token that is copied through untouched
static PX_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)"[^"]*"|'[^']*'|url\([^)]*\)|(\d*\.?\d+)px\b"#).expect("valid regex")
});

/// Rewrites `px` lengths in declaration values as `rpx`
#[derive(Debug, Clone)]
pub struct PxToRpx {
    ratio: f64,
    precision: u32,
}

impl PxToRpx {
    pub fn new(ratio: f64, precision: u32) -> Self {
        Self { ratio, precision }
    }

    fn convert_value(&self, value: &str) -> String {
        PX_VALUE
            .replace_all(value, |caps: &Captures| {
                match caps.get(1).map(|m| m.as_str().parse::<f64>()) {
                    Some(Ok(px)) => format!("{}rpx", format_number(px * self.ratio, self.precision)),
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

impl PostProcess for PxToRpx {
    fn name(&self) -> &'static str {
        "px2rpx"
    }

    fn process(&self, css: &str) -> Result<String, String> {
        Ok(DECLARATION
            .replace_all(css, |caps: &Captures| {
                format!("{}{}{}", &caps[1], self.convert_value(&caps[2]), &caps[3])
            })
            .into_owned())
    }
}

fn format_number(value: f64, precision: u32) -> String {
    let factor = 10f64.powi(precision as i32);
    let rounded = (value * factor).round() / factor;
    format!("{}", rounded)
}

/// Adds vendor prefixes required by a browserslist range
///
/// Prefixing goes through lightningcss's minifier, so the output is also
/// normalized: adjacent rules with the same selector are merged, empty rules
/// are dropped and colors may be shortened (`#ff0000` becomes `red`).
/// Declarations keep their values, and units lightningcss does not know
/// (`rpx`) are printed as written.
#[derive(Debug, Clone)]
pub struct Autoprefixer {
    targets: Targets,
}

impl Autoprefixer {
    pub fn new(queries: &[String]) -> Result<Self, String> {
        let browsers = Browsers::from_browserslist(queries.iter().map(String::as_str))
            .map_err(|e| format!("invalid browsers query: {}", e))?;

        Ok(Self {
            targets: Targets {
                browsers,
                ..Targets::default()
            },
        })
    }
}

impl PostProcess for Autoprefixer {
    fn name(&self) -> &'static str {
        "autoprefixer"
    }

    fn process(&self, css: &str) -> Result<String, String> {
        let mut sheet = StyleSheet::parse(css, ParserOptions::default()).map_err(|e| e.to_string())?;

        sheet
            .minify(MinifyOptions {
                targets: self.targets.clone(),
                ..MinifyOptions::default()
            })
            .map_err(|e| e.to_string())?;

        let printed = sheet
            .to_css(PrinterOptions {
                targets: self.targets.clone(),
                ..PrinterOptions::default()
            })
            .map_err(|e| e.to_string())?;

        Ok(printed.code)
    }
}

/// Ordered stages applied to every rendered stylesheet
#[derive(Default)]
pub struct PostProcessChain {
    stages: Vec<Box<dyn PostProcess>>,
}

impl PostProcessChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chain for a styles config. Disabled stages are left out.
    pub fn from_config(config: &StylesConfig) -> Result<Self, String> {
        let mut chain = Self::new();
        if config.px_to_rpx > 0.0 {
            chain = chain.with(PxToRpx::new(config.px_to_rpx, config.precision));
        }
        if !config.browsers.is_empty() {
            chain = chain.with(Autoprefixer::new(&config.browsers)?);
        }
        Ok(chain)
    }

    pub fn with(mut self, stage: impl PostProcess + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn process(&self, css: &str) -> Result<String, String> {
        let mut current = css.to_string();
        for stage in &self.stages {
            current = stage
                .process(&current)
                .map_err(|e| format!("{}: {}", stage.name(), e))?;
        }
        Ok(current)
    }
}
