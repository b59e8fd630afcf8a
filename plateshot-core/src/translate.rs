//! Optional prompt translation pass.
//!
//! When the active language differs from the working language, the prompt
//! body is rewritten through a text-completion provider. Two pieces must
//! survive untouched: a leading reference-image URL and any trailing
//! service parameters (`--flag value` pairs), so both are split off before
//! translation and reattached after. Translation failure is never fatal;
//! the original prompt is used as-is.

use crate::llm::LlmProvider;

/// The language prompts are assembled in.
pub const WORKING_LANGUAGE: &str = "en";

/// Translate the descriptive body of a prompt into `target_language`.
/// Returns the original prompt unchanged on any failure.
pub async fn translate_prompt(
    provider: &dyn LlmProvider,
    prompt: &str,
    target_language: &str,
) -> String {
    let parts = split_prompt(prompt);
    if parts.body.trim().is_empty() {
        return prompt.to_string();
    }

    let instruction = format!(
        "Translate the following image-generation prompt into {}. \
         Keep culinary terms natural for that language. \
         Reply with ONLY the translated text, nothing else.\n\n{}",
        target_language, parts.body
    );

    match provider.complete(&instruction).await {
        Ok(translated) => {
            let translated = translated.trim();
            if translated.is_empty() || looks_nonsensical(parts.body, translated) {
                tracing::warn!(
                    target_language = target_language,
                    "translation response unusable, keeping original prompt"
                );
                return prompt.to_string();
            }
            reassemble(&parts, translated)
        }
        Err(e) => {
            tracing::warn!(
                target_language = target_language,
                error = %e,
                "prompt translation failed, keeping original prompt"
            );
            prompt.to_string()
        }
    }
}

struct PromptParts<'a> {
    /// Leading reference-image URL, verbatim.
    url: Option<&'a str>,
    /// The translatable middle.
    body: &'a str,
    /// Trailing service parameters, verbatim.
    params: Option<&'a str>,
}

/// Split `[url] body [--params...]`. The parameter split is a heuristic:
/// everything from the first ` --` token onward is treated as parameters.
fn split_prompt(prompt: &str) -> PromptParts<'_> {
    let trimmed = prompt.trim();

    let (url, rest) = match trimmed.split_once(' ') {
        Some((first, rest)) if is_url(first) => (Some(first), rest),
        _ if is_url(trimmed) => (Some(trimmed), ""),
        _ => (None, trimmed),
    };

    let (body, params) = match rest.find(" --") {
        Some(idx) => (&rest[..idx], Some(rest[idx + 1..].trim_end())),
        None => (rest, None),
    };

    PromptParts { url, body, params }
}

fn is_url(token: &str) -> bool {
    token.starts_with("http://") || token.starts_with("https://")
}

/// A response wildly longer than the input is the model editorializing, not
/// translating.
fn looks_nonsensical(original: &str, translated: &str) -> bool {
    translated.len() > original.len().saturating_mul(4).max(200)
}

fn reassemble(parts: &PromptParts<'_>, translated_body: &str) -> String {
    let mut out = String::new();
    if let Some(url) = parts.url {
        out.push_str(url);
        out.push(' ');
    }
    out.push_str(translated_body);
    if let Some(params) = parts.params {
        out.push(' ');
        out.push_str(params);
    }
    out
}
