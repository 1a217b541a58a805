//! Scripted in-memory browser for tests.

use std::collections::{HashMap, HashSet};

use super::{Browser, BrowserError, By, ElementRef};

#[derive(Debug, Clone)]
pub struct MockNode {
    pub locator: By,
    pub text: String,
    pub attributes: HashMap<String, String>,
    pub target: Option<String>,
}

impl MockNode {
    pub fn new(locator: By) -> Self {
        Self {
            locator,
            text: String::new(),
            attributes: HashMap::new(),
            target: None,
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Clicking this node loads `url`.
    pub fn leads_to(mut self, url: &str) -> Self {
        self.target = Some(url.to_string());
        self
    }
}

#[derive(Debug, Default)]
pub struct MockBrowser {
    pages: HashMap<String, Vec<MockNode>>,
    frames: HashSet<String>,
    broken: HashSet<String>,
    quit_fails: bool,
    current: Option<String>,
    pub visited: Vec<String>,
    pub quit_calls: usize,
}

impl MockBrowser {
    pub fn page(mut self, url: &str, nodes: Vec<MockNode>) -> Self {
        self.pages.insert(url.to_string(), nodes);
        self
    }

    pub fn frame(mut self, name: &str) -> Self {
        self.frames.insert(name.to_string());
        self
    }

    /// Navigating to `url` fails as if the session had crashed.
    pub fn broken(mut self, url: &str) -> Self {
        self.broken.insert(url.to_string());
        self
    }

    /// Closing the session fails.
    pub fn quit_fails(mut self) -> Self {
        self.quit_fails = true;
        self
    }

    fn nodes(&self) -> Result<(&str, &[MockNode]), BrowserError> {
        let url = self.current.as_deref().ok_or_else(|| BrowserError::Driver {
            kind: "no such window".into(),
            message: "no page loaded".into(),
        })?;
        let nodes = self.pages.get(url).map(Vec::as_slice).unwrap_or(&[]);
        Ok((url, nodes))
    }

    fn node(&self, element: &ElementRef) -> Result<&MockNode, BrowserError> {
        let (url, nodes) = self.nodes()?;
        let stale = || BrowserError::Driver {
            kind: "stale element reference".into(),
            message: element.0.clone(),
        };
        let (page, index) = element.0.rsplit_once('#').ok_or_else(stale)?;
        if page != url {
            return Err(stale());
        }
        let index: usize = index.parse().map_err(|_| stale())?;
        nodes.get(index).ok_or_else(stale)
    }
}

impl Browser for MockBrowser {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        if self.broken.contains(url) {
            return Err(BrowserError::Driver {
                kind: "unknown error".into(),
                message: "session crashed".into(),
            });
        }
        self.visited.push(url.to_string());
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn find(&mut self, by: &By) -> Result<ElementRef, BrowserError> {
        let (url, nodes) = self.nodes()?;
        nodes
            .iter()
            .position(|n| &n.locator == by)
            .map(|i| ElementRef(format!("{url}#{i}")))
            .ok_or_else(|| BrowserError::NoSuchElement(by.clone()))
    }

    async fn find_all(&mut self, by: &By) -> Result<Vec<ElementRef>, BrowserError> {
        let (url, nodes) = self.nodes()?;
        Ok(nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| &n.locator == by)
            .map(|(i, _)| ElementRef(format!("{url}#{i}")))
            .collect())
    }

    async fn click(&mut self, element: &ElementRef) -> Result<(), BrowserError> {
        if let Some(target) = self.node(element)?.target.clone() {
            self.current = Some(target);
        }
        Ok(())
    }

    async fn attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        Ok(self.node(element)?.attributes.get(name).cloned())
    }

    async fn text(&mut self, element: &ElementRef) -> Result<String, BrowserError> {
        Ok(self.node(element)?.text.clone())
    }

    async fn switch_to_frame(&mut self, name: &str) -> Result<(), BrowserError> {
        if self.frames.contains(name) {
            Ok(())
        } else {
            Err(BrowserError::NoSuchFrame(name.to_string()))
        }
    }

    async fn quit(&mut self) -> Result<(), BrowserError> {
        self.quit_calls += 1;
        if self.quit_fails {
            return Err(BrowserError::Driver {
                kind: "invalid session id".into(),
                message: "session already deleted".into(),
            });
        }
        Ok(())
    }
}
