//! Continuous style gestures (drag-resize and the like)
//!
//! Frames write straight to the primary's inline style and never reach
//! history or mirrors. The session turns a committed gesture into one
//! ordinary style edit from the pre-gesture state to the last frame value.

use crate::css::Breakpoint;
use crate::dom::Document;
use crate::path::{NodePath, PathResolver};
use crate::EditorError;
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub struct StyleGesture {
    target: NodePath,
    property: String,
    armed: Vec<Breakpoint>,

    /// Inline value before the first frame
    start_inline: Option<String>,
    last_value: Option<String>,
    frames: usize,
}

impl StyleGesture {
    pub fn begin(
        doc: &Document,
        resolver: &PathResolver,
        target: NodePath,
        property: impl Into<String>,
        armed: Vec<Breakpoint>,
    ) -> Result<Self, EditorError> {
        let node = resolver
            .resolve(doc, &target)
            .ok_or_else(|| EditorError::AddressResolution(target.clone()))?;
        let property = property.into();
        let start_inline = doc.inline_style(node, &property).map(str::to_string);
        Ok(Self {
            target,
            property,
            armed,
            start_inline,
            last_value: None,
            frames: 0,
        })
    }

    /// Show an intermediate value on the primary
    pub fn update(&mut self, doc: &mut Document, resolver: &PathResolver, value: &str) -> Result<(), EditorError> {
        let node = resolver
            .resolve(doc, &self.target)
            .ok_or_else(|| EditorError::AddressResolution(self.target.clone()))?;
        doc.set_inline_style(node, &self.property, Some(value))?;
        self.last_value = Some(value.to_string());
        self.frames += 1;
        trace!(frame = self.frames, value, "Gesture frame");
        Ok(())
    }

    /// Put the pre-gesture inline value back
    pub fn restore(&self, doc: &mut Document, resolver: &PathResolver) -> Result<(), EditorError> {
        if self.frames == 0 {
            return Ok(());
        }
        let node = resolver
            .resolve(doc, &self.target)
            .ok_or_else(|| EditorError::AddressResolution(self.target.clone()))?;
        doc.set_inline_style(node, &self.property, self.start_inline.as_deref())?;
        Ok(())
    }

    pub fn target(&self) -> &NodePath {
        &self.target
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn armed(&self) -> &[Breakpoint] {
        &self.armed
    }

    /// Value of the latest frame, if any frame ran
    pub fn last_value(&self) -> Option<&str> {
        self.last_value.as_deref()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::SerializedNode;

    #[test]
    fn test_frames_write_inline_and_restore_clears_them() {
        let body = SerializedNode::element("body")
            .with_child(SerializedNode::element("div").with_attr("data-tr-id", "a"));
        let mut doc = Document::from_serialized("index.html", "data-tr-id", &body).unwrap();
        let resolver = PathResolver::new();

        let mut gesture =
            StyleGesture::begin(&doc, &resolver, NodePath::from_id("a"), "width", vec![]).unwrap();
        for px in 0..5 {
            gesture.update(&mut doc, &resolver, &format!("{}px", 100 + px)).unwrap();
        }
        let a = doc.find_by_id("a").unwrap();
        assert_eq!(doc.inline_style(a, "width"), Some("104px"));
        assert_eq!(gesture.frames(), 5);
        assert_eq!(gesture.last_value(), Some("104px"));

        gesture.restore(&mut doc, &resolver).unwrap();
        assert_eq!(doc.inline_style(a, "width"), None);
    }

    #[test]
    fn test_begin_on_missing_node_fails() {
        let doc = Document::new("index.html", "data-tr-id");
        let resolver = PathResolver::new();
        let result = StyleGesture::begin(&doc, &resolver, NodePath::from_id("nope"), "width", vec![]);
        assert!(matches!(result, Err(EditorError::AddressResolution(_))));
    }
}
