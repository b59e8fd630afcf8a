//! Prompt assembly for the image-generation service.

use serde_json::Value;

use crate::recipes::RecipeContent;

/// Fixed photographic qualifiers appended to every generated prompt.
pub const STYLE_QUALIFIERS: &str =
    "professional food photography, soft natural lighting, shallow depth of field, \
     appetizing presentation";

/// Only the first few ingredients carry signal; a full list drowns the
/// subject out.
const MAX_PROMPT_INGREDIENTS: usize = 3;

/// Build a generation prompt from recipe content.
///
/// The reference image URL, when present, is *prepended*: the service reads
/// an image reference only when it leads the prompt, and a misplaced
/// reference silently degrades output instead of erroring. Missing or
/// malformed ingredient data degrades to a title-only prompt; this function
/// never fails.
pub fn build_prompt(recipe: &RecipeContent, reference_image_url: Option<&str>) -> String {
    let mut description = format!("A beautifully plated {}", recipe.title.trim());

    let items = ingredient_items(recipe.ingredients.as_ref());
    if !items.is_empty() {
        description.push_str(" with ");
        description.push_str(&items.join(", "));
    }

    description.push_str(", ");
    description.push_str(STYLE_QUALIFIERS);

    match reference_image_url {
        Some(url) => format!("{} {}", url.trim(), description),
        None => description,
    }
}

/// Pull up to [`MAX_PROMPT_INGREDIENTS`] ingredient names out of whatever
/// JSON shape the recipe stores: an array of strings, or an array of objects
/// with an `item` field. Anything else yields nothing.
fn ingredient_items(ingredients: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(entries)) = ingredients else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(obj) => obj
                .get("item")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|item| !item.is_empty())
        .take(MAX_PROMPT_INGREDIENTS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn recipe(title: &str, ingredients: Option<serde_json::Value>) -> RecipeContent {
        RecipeContent {
            id: Uuid::new_v4(),
            title: title.to_string(),
            ingredients,
        }
    }

    #[test]
    fn test_prompt_includes_first_three_ingredients() {
        let recipe = recipe(
            "Minestrone",
            Some(json!([
                {"item": "cannellini beans", "amount": "1", "unit": "cup"},
                {"item": "carrots"},
                {"item": "celery"},
                {"item": "pasta shells"},
            ])),
        );
        let prompt = build_prompt(&recipe, None);
        assert!(prompt.contains("Minestrone"));
        assert!(prompt.contains("cannellini beans, carrots, celery"));
        assert!(!prompt.contains("pasta shells"));
        assert!(prompt.ends_with(STYLE_QUALIFIERS));
    }

    #[test]
    fn test_string_array_ingredients() {
        let recipe = recipe("Toast", Some(json!(["bread", "butter"])));
        let prompt = build_prompt(&recipe, None);
        assert!(prompt.contains("bread, butter"));
    }

    #[test]
    fn test_reference_url_leads_the_prompt() {
        let recipe = recipe("Pancakes", None);
        let prompt = build_prompt(&recipe, Some("https://img.example/ref.png"));
        assert!(prompt.starts_with("https://img.example/ref.png A beautifully plated Pancakes"));
    }

    #[test]
    fn test_missing_ingredients_degrades_to_title_only() {
        let recipe = recipe("Mystery Stew", None);
        let prompt = build_prompt(&recipe, None);
        assert_eq!(
            prompt,
            format!("A beautifully plated Mystery Stew, {}", STYLE_QUALIFIERS)
        );
    }

    #[test]
    fn test_malformed_ingredients_degrades_to_title_only() {
        let recipe = recipe("Odd Salad", Some(json!({"not": "an array"})));
        let prompt = build_prompt(&recipe, None);
        assert!(!prompt.contains("not"));
        assert!(prompt.contains("Odd Salad"));
    }
}
