//! Element to annotation mapping

use super::slide::{Annotation, Element};

/// Longest label taken verbatim from element text, in characters
pub const LABEL_MAX_CHARS: usize = 20;

const TRUNCATION_MARK: &str = "...";

/// Derive display annotations from a slide's elements.
///
/// Output is index-aligned with the input: `annotations[i].id == elements[i].id`
/// and bounding boxes are copied verbatim.
#[must_use]
pub fn derive_annotations(elements: &[Element]) -> Vec<Annotation> {
    elements
        .iter()
        .map(|element| Annotation {
            id: element.id,
            label: label_for(&element.text),
            bounding_box: element.bounding_box,
        })
        .collect()
}

/// First [`LABEL_MAX_CHARS`] characters of `text`, with `...` appended when cut
#[must_use]
pub fn label_for(text: &str) -> String {
    let mut chars = text.chars();
    let mut label: String = chars.by_ref().take(LABEL_MAX_CHARS).collect();
    if chars.next().is_some() {
        label.push_str(TRUNCATION_MARK);
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::BoundingBox;

    fn element(id: u32, text: &str, bbox: BoundingBox) -> Element {
        Element {
            id,
            text: text.to_string(),
            bounding_box: bbox,
        }
    }

    #[test]
    fn labels_are_truncated_and_aligned() {
        let first = BoundingBox::new(100.0, 50.0, 200.0, 900.0);
        let second = BoundingBox::new(300.0, 50.0, 350.0, 120.0);
        let elements = vec![
            element(0, "Neurons are the basic units of computation", first),
            element(1, "x", second),
        ];

        let annotations = derive_annotations(&elements);

        assert_eq!(annotations.len(), elements.len());
        assert_eq!(annotations[0].id, 0);
        assert_eq!(annotations[0].label, "Neurons are the basi...");
        assert_eq!(annotations[0].bounding_box, first);
        assert_eq!(annotations[1].id, 1);
        assert_eq!(annotations[1].label, "x");
        assert_eq!(annotations[1].bounding_box, second);
    }

    #[test]
    fn exact_length_is_not_truncated() {
        let text = "a".repeat(LABEL_MAX_CHARS);
        assert_eq!(label_for(&text), text);

        let longer = "a".repeat(LABEL_MAX_CHARS + 1);
        assert_eq!(label_for(&longer), format!("{text}..."));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let text = "é".repeat(LABEL_MAX_CHARS + 5);
        let label = label_for(&text);
        assert_eq!(label.chars().count(), LABEL_MAX_CHARS + 3);
        assert!(label.starts_with("éééé"));
    }

    #[test]
    fn empty_elements_yield_empty_annotations() {
        assert!(derive_annotations(&[]).is_empty());
    }
}
