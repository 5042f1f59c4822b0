use crate::request::normalize::{END_MARKER, START_MARKER};

/// Fragments that mark text as PlantUML even without `@startuml`/`@enduml`.
const DIAGRAM_HINTS: &[&str] = &[
    "->",
    "-->",
    "skinparam",
    "class ",
    "actor ",
    "usecase ",
    "rectangle ",
    "interface ",
    "note ",
    "partition ",
];

/// Why the preview did not render a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Only whitespace.
    Empty,
    /// Text does not look like a PlantUML description.
    NotDiagram,
}

/// Cheap heuristic used before spending an engine call on editor text.
pub fn looks_like_diagram(text: &str) -> bool {
    let t = text.trim();
    if t.is_empty() {
        return false;
    }
    if t.contains(START_MARKER) && t.contains(END_MARKER) {
        return true;
    }
    DIAGRAM_HINTS.iter().any(|k| t.contains(k))
}

/// Decide whether `text` is worth rendering.
pub fn classify(text: &str) -> Result<&str, SkipReason> {
    let t = text.trim();
    if t.is_empty() {
        return Err(SkipReason::Empty);
    }
    if !looks_like_diagram(t) {
        return Err(SkipReason::NotDiagram);
    }
    Ok(t)
}

#[cfg(test)]
#[path = "../../tests/unit/preview/detect.rs"]
mod tests;
