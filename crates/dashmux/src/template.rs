use regex::{Regex, Replacer};
use std::{collections::HashMap, sync::LazyLock};

// From DASH-IF IOP: only %0[width]d is permitted as a format tag inside
// identifiers, and "$$" is an escaped "$". Unknown identifiers must pass
// through untouched.
//
// Example template: "$RepresentationID$/$Number%06d$.m4s"
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(RepresentationID|Number|Time|Bandwidth)(?:%0(\d+)d)?\$|\$\$").unwrap()
});

pub struct Template<'a> {
    args: HashMap<&'a str, String>,
}

impl Template<'_> {
    pub const REPRESENTATION_ID: &'static str = "RepresentationID";
    pub const NUMBER: &'static str = "Number";
    pub const TIME: &'static str = "Time";
    pub const BANDWIDTH: &'static str = "Bandwidth";

    pub fn new() -> Self {
        Self {
            args: HashMap::with_capacity(4),
        }
    }

    pub fn insert(&mut self, key: &'static str, value: String) -> &mut Self {
        self.args.insert(key, value);
        self
    }

    pub fn resolve(&self, template: &str) -> String {
        TEMPLATE_REGEX
            .replace_all(template, TemplateReplacer(&self.args))
            .to_string()
    }
}

impl Default for Template<'_> {
    fn default() -> Self {
        Self::new()
    }
}

struct TemplateReplacer<'a>(&'a HashMap<&'a str, String>);

impl Replacer for TemplateReplacer<'_> {
    fn replace_append(&mut self, caps: &regex::Captures<'_>, dst: &mut String) {
        let Some(key) = caps.get(1) else {
            // the "$$" escape
            dst.push('$');
            return;
        };

        let Some(value) = self.0.get(key.as_str()) else {
            dst.push_str(caps.get(0).unwrap().as_str());
            return;
        };

        match caps.get(2).map(|m| m.as_str().parse::<usize>().unwrap()) {
            Some(width) => dst.push_str(&format!("{value:0>width$}")),
            None => dst.push_str(value.as_str()),
        }
    }
}
