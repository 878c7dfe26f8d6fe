//! Structural selectors.
//!
//! Supports the subset the anchor builder emits plus what hand-written
//! locators commonly use: `tag`, `*`, `#id`, `.class`, `[attr]`,
//! `[attr="value"]`, `:nth-of-type(n)`, joined by descendant or `>` child
//! combinators.

use std::str::FromStr;

use super::{Document, NodeId};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrMatch {
    Exists(String),
    Equals(String, String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
    nth_of_type: Option<usize>,
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(data) = doc.element(node) else {
            return false;
        };
        if self.tag.as_deref().is_some_and(|tag| tag != data.tag) {
            return false;
        }
        if self.id.as_deref().is_some_and(|id| data.id() != Some(id)) {
            return false;
        }
        if !self.classes.iter().all(|class| data.has_class(class)) {
            return false;
        }
        let attrs_match = self.attrs.iter().all(|attr| match attr {
            AttrMatch::Exists(name) => data.attr(name).is_some(),
            AttrMatch::Equals(name, value) => data.attr(name) == Some(value.as_str()),
        });
        if !attrs_match {
            return false;
        }
        match self.nth_of_type {
            Some(expected) => nth_of_type(doc, node) == Some(expected),
            None => true,
        }
    }

    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.nth_of_type.is_none()
    }
}

/// 1-based position of `node` among its element siblings with the same tag.
pub(crate) fn nth_of_type(doc: &Document, node: NodeId) -> Option<usize> {
    let tag = &doc.element(node)?.tag;
    let Some(parent) = doc.parent(node) else {
        return Some(1);
    };
    doc.children(parent)
        .iter()
        .filter(|sibling| doc.element(**sibling).is_some_and(|data| &data.tag == tag))
        .position(|sibling| *sibling == node)
        .map(|index| index + 1)
}

/// Count of element siblings (including `node`) sharing its tag.
pub(crate) fn same_tag_siblings(doc: &Document, node: NodeId) -> usize {
    let Some(tag) = doc.element(node).map(|data| data.tag.clone()) else {
        return 0;
    };
    doc.parent(node).map_or(1, |parent| {
        doc.children(parent)
            .iter()
            .filter(|sibling| doc.element(**sibling).is_some_and(|data| data.tag == tag))
            .count()
    })
}

/// Whether `value` can be written as a bare selector identifier.
pub(crate) fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_' || first == '-')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parsed structural selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    // First combinator is unused.
    parts: Vec<(Combinator, Compound)>,
}

impl Selector {
    /// Whether `node` matches, checking ancestors above any search root too.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.matches_at(doc, node, self.parts.len() - 1)
    }

    fn matches_at(&self, doc: &Document, node: NodeId, index: usize) -> bool {
        let (combinator, compound) = &self.parts[index];
        if !compound.matches(doc, node) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => doc
                .parent(node)
                .is_some_and(|parent| self.matches_at(doc, parent, index - 1)),
            Combinator::Descendant => doc
                .ancestors(node)
                .any(|ancestor| self.matches_at(doc, ancestor, index - 1)),
        }
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Parser::new(input).parse()
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::InvalidSelector {
            selector: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn expect(&mut self, expected: char) -> Result<(), Error> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{expected}' at position {}", self.pos)))
        }
    }

    fn identifier(&mut self) -> Result<String, Error> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error(format!("expected identifier at position {start}")));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse(mut self) -> Result<Selector, Error> {
        let mut parts = Vec::new();
        let mut combinator = Combinator::Descendant;
        self.skip_whitespace();
        if self.peek().is_none() {
            return Err(self.error("selector is empty"));
        }

        loop {
            let compound = self.compound()?;
            parts.push((combinator, compound));

            let had_space = self.skip_whitespace();
            match self.peek() {
                None => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    combinator = Combinator::Child;
                }
                Some(_) if had_space => combinator = Combinator::Descendant,
                Some(other) => {
                    return Err(self.error(format!("unexpected '{other}' at position {}", self.pos)))
                }
            }
            if self.peek().is_none() {
                return Err(self.error("selector ends with a combinator"));
            }
        }

        Ok(Selector { parts })
    }

    fn compound(&mut self) -> Result<Compound, Error> {
        let mut compound = Compound::default();
        match self.peek() {
            Some('*') => self.pos += 1,
            Some(c) if c.is_ascii_alphabetic() => {
                compound.tag = Some(self.identifier()?.to_ascii_lowercase());
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.identifier()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.identifier()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    compound.nth_of_type = Some(self.pseudo()?);
                }
                _ => break,
            }
        }

        let wildcard = self.pos > 0 && self.chars[self.pos - 1] == '*';
        if compound.is_empty() && !wildcard {
            return Err(self.error(format!("expected selector at position {}", self.pos)));
        }
        Ok(compound)
    }

    fn attribute(&mut self) -> Result<AttrMatch, Error> {
        self.skip_whitespace();
        let name = self.identifier()?;
        self.skip_whitespace();
        if self.peek() == Some(']') {
            self.pos += 1;
            return Ok(AttrMatch::Exists(name));
        }
        self.expect('=')?;
        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.expect(quote)?;
                value
            }
            _ => self.identifier()?,
        };
        self.skip_whitespace();
        self.expect(']')?;
        Ok(AttrMatch::Equals(name, value))
    }

    fn pseudo(&mut self) -> Result<usize, Error> {
        let name = self.identifier()?;
        if name != "nth-of-type" {
            return Err(self.error(format!("unsupported pseudo-class ':{name}'")));
        }
        self.expect('(')?;
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        let index = digits
            .parse::<usize>()
            .ok()
            .filter(|index| *index > 0)
            .ok_or_else(|| self.error("nth-of-type expects a positive integer"))?;
        self.expect(')')?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, Vec<NodeId>) {
        let mut doc = Document::new("div");
        let section = doc.create_element("section");
        doc.element_mut(section).unwrap().set_attr("id", "chapter-1");
        doc.append_child(doc.root(), section);

        let mut paragraphs = Vec::new();
        for class in ["intro", "body", "body"] {
            let p = doc.create_element("p");
            doc.element_mut(p).unwrap().set_attr("class", class);
            doc.element_mut(p).unwrap().set_attr("data-page-number", "2");
            doc.append_child(section, p);
            paragraphs.push(p);
        }
        (doc, paragraphs)
    }

    fn query(doc: &Document, selector: &str) -> Vec<NodeId> {
        doc.query_selector_all(doc.root(), selector).unwrap()
    }

    #[test]
    fn matches_ids_classes_and_tags() {
        let (doc, paragraphs) = sample();
        assert_eq!(query(&doc, "p.intro"), vec![paragraphs[0]]);
        assert_eq!(query(&doc, ".body"), paragraphs[1..].to_vec());
        assert_eq!(query(&doc, "#chapter-1 p").len(), 3);
    }

    #[test]
    fn matches_child_combinator_and_nth_of_type() {
        let (doc, paragraphs) = sample();
        assert_eq!(query(&doc, "#chapter-1 > p:nth-of-type(2)"), vec![paragraphs[1]]);
        assert!(query(&doc, "div > p").is_empty());
    }

    #[test]
    fn matches_attribute_selectors() {
        let (doc, paragraphs) = sample();
        assert_eq!(query(&doc, r#"[data-page-number="2"]"#), paragraphs);
        assert_eq!(query(&doc, "p[data-page-number]").len(), 3);
        assert!(query(&doc, "[data-page-number='3']").is_empty());
    }

    #[test]
    fn rejects_malformed_selectors() {
        for input in ["", "p >", "p[", "#", "p:hover", "p:nth-of-type(0)", "p,div"] {
            assert!(input.parse::<Selector>().is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn identifier_check() {
        assert!(is_identifier("chapter-1"));
        assert!(!is_identifier("1chapter"));
        assert!(!is_identifier("two words"));
    }
}
