//! Permissive markup tree
//!
//! A forgiving tokenizer and tree builder for fixture files. It never fails:
//! unmatched end tags are dropped, unclosed elements are closed at end of
//! input, and unknown tags or attributes pass through untouched. Text and
//! attribute values are kept raw (entities are not decoded) so serializing an
//! unmodified tree reproduces the source closely.

/// Index of a node in the document arena
pub type NodeId = usize;

/// Elements whose content is raw text up to the matching end tag
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Elements that never have children or an end tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    Double,
    Single,
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
    pub quote: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Tag name as written
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub self_closing: bool,
}

impl Element {
    /// Case-insensitive tag check
    pub fn is(&self, tag: &str) -> bool {
        self.name.eq_ignore_ascii_case(tag)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .and_then(|a| a.value.as_deref())
    }

    /// Replace the value of an existing attribute; returns false when absent
    pub fn set_attr(&mut self, name: &str, value: String) -> bool {
        match self.attrs.iter_mut().find(|a| a.name.eq_ignore_ascii_case(name)) {
            Some(attr) => {
                attr.value = Some(value);
                if attr.quote == Quote::Bare {
                    attr.quote = Quote::Double;
                }
                true
            }
            None => false,
        }
    }

    fn is_void(&self) -> bool {
        VOID_ELEMENTS.iter().any(|t| self.is(t))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
    /// Raw `<!...>` or `<?...>` declaration body, opener included
    Declaration(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Parsed fixture tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub const ROOT: NodeId = 0;

    /// Parse markup; never fails
    pub fn parse(text: &str) -> Self {
        Parser::new(text).run()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Overwrite a text node's payload; non-text nodes are left alone
    pub fn set_text(&mut self, id: NodeId, payload: String) {
        if let NodeKind::Text(t) = &mut self.nodes[id].kind {
            *t = payload;
        }
    }

    /// Unlink a node from its parent. The subtree stays in the arena but is
    /// no longer reachable from the root.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|&c| c != id);
        }
    }

    /// Element children of the document node
    pub fn top_level_elements(&self) -> impl Iterator<Item = &Element> + '_ {
        self.children(Self::ROOT)
            .iter()
            .filter_map(move |&id| self.element(id))
    }

    /// Pre-order depth-first walk from the root, excluding the root itself
    pub fn descendants(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = self.children(Self::ROOT).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        order
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_node(Self::ROOT, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        match &node.kind {
            NodeKind::Document => {
                for &child in &node.children {
                    self.write_node(child, out);
                }
            }
            NodeKind::Text(t) => out.push_str(t),
            NodeKind::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            NodeKind::Declaration(d) => {
                out.push('<');
                out.push_str(d);
                out.push('>');
            }
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for attr in &el.attrs {
                    out.push(' ');
                    out.push_str(&attr.name);
                    if let Some(value) = &attr.value {
                        out.push('=');
                        match attr.quote {
                            Quote::Single => {
                                out.push('\'');
                                out.push_str(value);
                                out.push('\'');
                            }
                            Quote::Bare if !value.is_empty() => out.push_str(value),
                            _ => {
                                out.push('"');
                                out.push_str(&value.replace('"', "&quot;"));
                                out.push('"');
                            }
                        }
                    }
                }
                if el.self_closing {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                if el.is_void() {
                    return;
                }
                for &child in &node.children {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    fn push_text(&mut self, parent: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(&last) = self.nodes[parent].children.last() {
            if let NodeKind::Text(existing) = &mut self.nodes[last].kind {
                existing.push_str(text);
                return;
            }
        }
        self.push(parent, NodeKind::Text(text.to_string()));
    }
}

struct Parser<'a> {
    text: &'a str,
    lower: String,
    pos: usize,
    doc: Document,
    open: Vec<NodeId>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            lower: text.to_ascii_lowercase(),
            pos: 0,
            doc: Document {
                nodes: vec![Node {
                    kind: NodeKind::Document,
                    parent: None,
                    children: Vec::new(),
                }],
            },
            open: vec![Document::ROOT],
        }
    }

    fn current(&self) -> NodeId {
        *self.open.last().unwrap_or(&Document::ROOT)
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn byte(&self, at: usize) -> Option<u8> {
        self.text.as_bytes().get(at).copied()
    }

    fn run(mut self) -> Document {
        while self.pos < self.text.len() {
            let rest = self.rest();
            if rest.starts_with("<!--") {
                self.comment();
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.declaration();
            } else if rest.starts_with("</") && self.byte(self.pos + 2).is_some_and(|b| b.is_ascii_alphabetic()) {
                self.end_tag();
            } else if rest.starts_with('<') && self.byte(self.pos + 1).is_some_and(|b| b.is_ascii_alphabetic()) {
                self.start_tag();
            } else {
                self.text_run();
            }
        }
        self.doc
    }

    fn comment(&mut self) {
        let body_start = self.pos + 4;
        let (body_end, next) = match self.text[body_start..].find("-->") {
            Some(i) => (body_start + i, body_start + i + 3),
            None => (self.text.len(), self.text.len()),
        };
        let body = self.text[body_start..body_end].to_string();
        let parent = self.current();
        self.doc.push(parent, NodeKind::Comment(body));
        self.pos = next;
    }

    fn declaration(&mut self) {
        let body_start = self.pos + 1;
        let (body_end, next) = match self.text[body_start..].find('>') {
            Some(i) => (body_start + i, body_start + i + 1),
            None => (self.text.len(), self.text.len()),
        };
        let body = self.text[body_start..body_end].to_string();
        let parent = self.current();
        self.doc.push(parent, NodeKind::Declaration(body));
        self.pos = next;
    }

    fn end_tag(&mut self) {
        let name_start = self.pos + 2;
        let name_end = self.scan_name(name_start);
        let name = &self.text[name_start..name_end];
        self.pos = match self.text[name_end..].find('>') {
            Some(i) => name_end + i + 1,
            None => self.text.len(),
        };

        // Close up to the nearest matching open element; stray end tags are ignored.
        let matching = self.open.iter().rposition(|&id| {
            self.doc
                .element(id)
                .is_some_and(|el| el.name.eq_ignore_ascii_case(name))
        });
        if let Some(index) = matching {
            self.open.truncate(index);
        }
    }

    fn start_tag(&mut self) {
        let name_start = self.pos + 1;
        let name_end = self.scan_name(name_start);
        let name = self.text[name_start..name_end].to_string();
        self.pos = name_end;

        let mut attrs = Vec::new();
        let mut self_closing = false;
        loop {
            self.skip_whitespace();
            match self.byte(self.pos) {
                None => break,
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') if self.byte(self.pos + 1) == Some(b'>') => {
                    self_closing = true;
                    self.pos += 2;
                    break;
                }
                Some(b'/') => self.pos += 1,
                Some(_) => attrs.push(self.attribute()),
            }
        }

        let element = Element {
            name,
            attrs,
            self_closing,
        };
        let raw_text = RAW_TEXT_ELEMENTS.iter().any(|t| element.is(t));
        let leaf = element.self_closing || element.is_void();
        let tag = element.name.to_ascii_lowercase();

        let parent = self.current();
        let id = self.doc.push(parent, NodeKind::Element(element));

        if leaf {
            return;
        }
        if raw_text {
            self.raw_text(id, &tag);
        } else {
            self.open.push(id);
        }
    }

    fn raw_text(&mut self, id: NodeId, tag: &str) {
        let needle = format!("</{tag}");
        let content_end = self.lower[self.pos..]
            .find(&needle)
            .map(|i| self.pos + i)
            .unwrap_or(self.text.len());
        let content = &self.text[self.pos..content_end];
        self.doc.push_text(id, content);

        self.pos = match self.text[content_end..].find('>') {
            Some(i) => content_end + i + 1,
            None => self.text.len(),
        };
    }

    fn attribute(&mut self) -> Attribute {
        let name_start = self.pos;
        while let Some(b) = self.byte(self.pos) {
            if b.is_ascii_whitespace() || b == b'=' || b == b'>' || (b == b'/' && self.pos > name_start) {
                break;
            }
            self.pos += 1;
        }
        let name = self.text[name_start..self.pos].to_string();

        self.skip_whitespace();
        if self.byte(self.pos) != Some(b'=') {
            return Attribute {
                name,
                value: None,
                quote: Quote::Bare,
            };
        }
        self.pos += 1;
        self.skip_whitespace();

        match self.byte(self.pos) {
            Some(q @ (b'"' | b'\'')) => {
                let value_start = self.pos + 1;
                let value_end = self.text[value_start..]
                    .find(q as char)
                    .map(|i| value_start + i)
                    .unwrap_or(self.text.len());
                self.pos = (value_end + 1).min(self.text.len());
                Attribute {
                    name,
                    value: Some(self.text[value_start..value_end].to_string()),
                    quote: if q == b'"' { Quote::Double } else { Quote::Single },
                }
            }
            _ => {
                let value_start = self.pos;
                while let Some(b) = self.byte(self.pos) {
                    if b.is_ascii_whitespace() || b == b'>' {
                        break;
                    }
                    self.pos += 1;
                }
                Attribute {
                    name,
                    value: Some(self.text[value_start..self.pos].to_string()),
                    quote: Quote::Bare,
                }
            }
        }
    }

    fn text_run(&mut self) {
        // A '<' that opened nothing is literal text.
        let search_from = if self.byte(self.pos) == Some(b'<') {
            self.pos + 1
        } else {
            self.pos
        };
        let end = self.text[search_from..]
            .find('<')
            .map(|i| search_from + i)
            .unwrap_or(self.text.len());
        let parent = self.current();
        self.doc.push_text(parent, &self.text[self.pos..end]);
        self.pos = end;
    }

    fn scan_name(&self, start: usize) -> usize {
        let mut end = start;
        while let Some(b) = self.byte(end) {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.') {
                end += 1;
            } else {
                break;
            }
        }
        end
    }

    fn skip_whitespace(&mut self) {
        while self.byte(self.pos).is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }
}
