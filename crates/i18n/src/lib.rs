//! UI strings backed by Fluent resources embedded at build time.
//!
//! Lookups fall back to English when the active language lacks a message, and
//! to the key itself when no bundle knows it.

use doc_model::Language;
use fluent_bundle::{FluentBundle, FluentResource};
use std::collections::HashMap;
use unic_langid::LanguageIdentifier;

pub use fluent_bundle::{FluentArgs, FluentValue};

const FALLBACK: Language = Language::En;

fn source(language: Language) -> &'static str {
    match language {
        Language::En => include_str!("../locales/en.ftl"),
        Language::Th => include_str!("../locales/th.ftl"),
    }
}

fn locale_id(language: Language) -> LanguageIdentifier {
    match language {
        Language::En => unic_langid::langid!("en-US"),
        Language::Th => unic_langid::langid!("th-TH"),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum I18nError {
    #[error("invalid {language} strings: {details}")]
    Parse { language: Language, details: String },
}

pub struct I18n {
    bundles: HashMap<Language, FluentBundle<FluentResource>>,
    current: Language,
}

impl I18n {
    pub fn new(language: Language) -> Result<Self, I18nError> {
        let mut bundles = HashMap::new();

        for language in Language::ALL {
            let resource = FluentResource::try_new(source(language).to_owned()).map_err(
                |(_, errors)| I18nError::Parse { language, details: format!("{errors:?}") },
            )?;

            let mut bundle = FluentBundle::new(vec![locale_id(language)]);
            // Status lines are plain terminal text; no bidi isolation marks.
            bundle.set_use_isolating(false);
            bundle
                .add_resource(resource)
                .map_err(|errors| I18nError::Parse { language, details: format!("{errors:?}") })?;
            bundles.insert(language, bundle);
        }

        Ok(Self { bundles, current: language })
    }

    pub fn language(&self) -> Language {
        self.current
    }

    pub fn set_language(&mut self, language: Language) {
        self.current = language;
    }

    pub fn tr(&self, key: &str) -> String {
        self.format(key, None)
    }

    pub fn tr_args(&self, key: &str, args: &FluentArgs<'_>) -> String {
        self.format(key, Some(args))
    }

    fn format(&self, key: &str, args: Option<&FluentArgs<'_>>) -> String {
        [self.current, FALLBACK]
            .into_iter()
            .find_map(|language| self.format_in(language, key, args))
            .unwrap_or_else(|| {
                tracing::debug!(key, "missing UI string");
                key.to_owned()
            })
    }

    fn format_in(
        &self,
        language: Language,
        key: &str,
        args: Option<&FluentArgs<'_>>,
    ) -> Option<String> {
        let bundle = self.bundles.get(&language)?;
        let pattern = bundle.get_message(key)?.value()?;

        let mut errors = Vec::new();
        let value = bundle.format_pattern(pattern, args, &mut errors);
        if !errors.is_empty() {
            tracing::warn!(key, ?errors, "failed to format UI string");
            return None;
        }

        Some(value.into_owned())
    }
}
