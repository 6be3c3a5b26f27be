//! Tag-based querying over fetched XML pages.
//!
//! The harvester only needs three capabilities from a parsed page: find every
//! element with a given tag name, find the first one, and read an element's
//! normalized text. [`MarkupNode`] names those capabilities so extraction does
//! not depend on `roxmltree` directly.

use crate::error::{HarvestError, HarvestResult};

/// Query capability shared by documents and elements.
pub trait MarkupNode: Sized {
    /// All descendant elements with local name `tag`, at any depth, in document order.
    fn find_all(&self, tag: &str) -> Vec<Self>;

    /// First descendant element with local name `tag`.
    fn find_first(&self, tag: &str) -> Option<Self> {
        self.find_all(tag).into_iter().next()
    }

    /// Text content with whitespace runs collapsed to single spaces and trimmed.
    fn text(&self) -> String;
}

/// One parsed response body.
pub struct MarkupDocument<'input> {
    doc: roxmltree::Document<'input>,
}

impl<'input> MarkupDocument<'input> {
    /// Parse a response body as XML.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::MalformedMarkup`] if the body is not well-formed.
    pub fn parse(body: &'input str) -> HarvestResult<Self> {
        roxmltree::Document::parse(body)
            .map(|doc| Self { doc })
            .map_err(|e| HarvestError::MalformedMarkup(e.to_string()))
    }

    /// The document node; queries on it search the whole page.
    #[must_use]
    pub fn root(&self) -> Element<'_, 'input> {
        Element(self.doc.root())
    }

    /// See [`MarkupNode::find_all`].
    #[must_use]
    pub fn find_all(&self, tag: &str) -> Vec<Element<'_, 'input>> {
        self.root().find_all(tag)
    }

    /// See [`MarkupNode::find_first`].
    #[must_use]
    pub fn find_first(&self, tag: &str) -> Option<Element<'_, 'input>> {
        self.root().find_first(tag)
    }
}

impl std::fmt::Debug for MarkupDocument<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkupDocument")
            .field("root", &self.doc.root_element().tag_name().name())
            .finish()
    }
}

/// An element (or the document node) inside a [`MarkupDocument`].
#[derive(Debug, Clone, Copy)]
pub struct Element<'a, 'input>(roxmltree::Node<'a, 'input>);

impl Element<'_, '_> {
    /// Local tag name, without namespace prefix. Empty for the document node.
    #[must_use]
    pub fn tag_name(&self) -> &str {
        self.0.tag_name().name()
    }

    /// Attribute value by local name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.0.attribute(name)
    }
}

impl MarkupNode for Element<'_, '_> {
    fn find_all(&self, tag: &str) -> Vec<Self> {
        self.0
            .descendants()
            .skip(1)
            .filter(|n| n.is_element() && n.tag_name().name() == tag)
            .map(Element)
            .collect()
    }

    fn find_first(&self, tag: &str) -> Option<Self> {
        self.0
            .descendants()
            .skip(1)
            .find(|n| n.is_element() && n.tag_name().name() == tag)
            .map(Element)
    }

    fn text(&self) -> String {
        self.0
            .descendants()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
