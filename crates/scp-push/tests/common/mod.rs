//! In-memory emulation of a remote `scp -t` sink.
//!
//! The emulator parses exactly what the client writes, answers with the
//! acknowledgements an OpenSSH sink would send, and materialises the pushed
//! entries in a [`RemoteTree`] the tests can inspect afterwards.

#![allow(dead_code)]

use scp_push::scp::ScpSession;
use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::rc::Rc;

// ── Remote tree ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    File { mode: u32, data: Vec<u8> },
    Dir { mode: u32, children: BTreeMap<String, Node> },
}

impl Node {
    pub fn mode(&self) -> u32 {
        match self {
            Node::File { mode, .. } | Node::Dir { mode, .. } => *mode,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RemoteTree {
    root: Node,
}

fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty() && *c != ".").collect()
}

impl Default for RemoteTree {
    fn default() -> Self {
        Self {
            root: Node::Dir {
                mode: 0o755,
                children: BTreeMap::new(),
            },
        }
    }
}

impl RemoteTree {
    pub fn get(&self, path: &str) -> Option<&Node> {
        let mut node = &self.root;
        for part in components(path) {
            match node {
                Node::Dir { children, .. } => node = children.get(part)?,
                Node::File { .. } => return None,
            }
        }
        Some(node)
    }

    fn get_mut(&mut self, path: &str) -> Option<&mut Node> {
        let mut node = &mut self.root;
        for part in components(path) {
            match node {
                Node::Dir { children, .. } => node = children.get_mut(part)?,
                Node::File { .. } => return None,
            }
        }
        Some(node)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.get(path).map(Node::is_dir).unwrap_or(false)
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.get(path)? {
            Node::File { data, .. } => Some(data.clone()),
            Node::Dir { .. } => None,
        }
    }

    /// Names directly under `path`, sorted.
    pub fn list(&self, path: &str) -> Vec<String> {
        match self.get(path) {
            Some(Node::Dir { children, .. }) => children.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn mkdir_p(&mut self, path: &str) {
        let mut node = &mut self.root;
        for part in components(path) {
            let Node::Dir { children, .. } = node else {
                panic!("{path}: not a directory");
            };
            node = children.entry(part.to_string()).or_insert(Node::Dir {
                mode: 0o755,
                children: BTreeMap::new(),
            });
        }
    }

    /// Insert `node` at `path`; the parent must be an existing directory.
    fn put(&mut self, path: &str, node: Node) -> Result<(), String> {
        let parts = components(path);
        let Some((name, parent_parts)) = parts.split_last() else {
            return Err(format!("{path}: invalid target"));
        };
        let parent_path = parent_parts.join("/");
        match self.get_mut(&parent_path) {
            Some(Node::Dir { children, .. }) => {
                children.insert(name.to_string(), node);
                Ok(())
            }
            _ => Err(format!("{path}: No such file or directory")),
        }
    }
}

fn join(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

// ── Sink state machine ───────────────────────────────────────────────────────

enum Phase {
    Line,
    Payload {
        dest: String,
        mode: u32,
        remaining: u64,
        data: Vec<u8>,
    },
    Terminator {
        dest: String,
        mode: u32,
        data: Vec<u8>,
    },
    Dead,
}

pub struct SinkState {
    pub tree: RemoteTree,
    pub command: Option<String>,
    /// Names the sink refuses with a `0x01` acknowledgement.
    pub reject_names: HashSet<String>,
    pub refuse_start: bool,
    target: String,
    recursive: bool,
    dirs: Vec<String>,
    pending: Vec<u8>,
    phase: Phase,
    replies: VecDeque<u8>,
}

impl SinkState {
    fn ack(&mut self) {
        self.replies.push_back(0);
    }

    fn nak(&mut self, status: u8, reason: &str) {
        self.replies.push_back(status);
        self.replies.extend(format!("scp: {reason}\n").bytes());
    }

    fn start(&mut self, command: &str) -> io::Result<()> {
        if self.refuse_start {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "exec refused"));
        }
        self.command = Some(command.to_string());
        let words = split_command(command);
        let flags: Vec<&str> = words[1..words.len() - 1].iter().map(String::as_str).collect();
        assert!(flags.contains(&"-t"), "sink mode flag missing: {command}");
        self.recursive = flags.contains(&"-r");
        self.target = words.last().cloned().unwrap_or_default();
        self.ack();
        Ok(())
    }

    /// Where an entry named `name` lands for the current nesting level.
    fn destination(&self, name: &str) -> String {
        match self.dirs.last() {
            Some(dir) => join(dir, name),
            None if self.tree.is_dir(&self.target) => join(&self.target, name),
            None => self.target.clone(),
        }
    }

    fn feed(&mut self, mut input: &[u8]) {
        while !input.is_empty() {
            match &mut self.phase {
                Phase::Dead => return,
                Phase::Line => {
                    let Some(pos) = input.iter().position(|b| *b == b'\n') else {
                        self.pending.extend_from_slice(input);
                        return;
                    };
                    self.pending.extend_from_slice(&input[..pos]);
                    input = &input[pos + 1..];
                    let line = String::from_utf8(std::mem::take(&mut self.pending))
                        .expect("control line is UTF-8");
                    self.handle_line(&line);
                }
                Phase::Payload {
                    remaining, data, ..
                } => {
                    let take = (*remaining).min(input.len() as u64) as usize;
                    data.extend_from_slice(&input[..take]);
                    *remaining -= take as u64;
                    input = &input[take..];
                    if *remaining == 0 {
                        self.to_terminator();
                    }
                }
                Phase::Terminator { .. } => {
                    let byte = input[0];
                    input = &input[1..];
                    self.finish_file(byte);
                }
            }
        }
    }

    fn to_terminator(&mut self) {
        if let Phase::Payload {
            dest, mode, data, ..
        } = std::mem::replace(&mut self.phase, Phase::Line)
        {
            self.phase = Phase::Terminator { dest, mode, data };
        }
    }

    fn finish_file(&mut self, byte: u8) {
        let Phase::Terminator { dest, mode, data } =
            std::mem::replace(&mut self.phase, Phase::Line)
        else {
            return;
        };
        if byte != 0 {
            self.phase = Phase::Dead;
            return;
        }
        match self.tree.put(&dest, Node::File { mode, data }) {
            Ok(()) => self.ack(),
            Err(reason) => self.nak(1, &reason),
        }
    }

    fn handle_line(&mut self, line: &str) {
        let (kind, rest) = line.split_at(1);
        match kind {
            "C" => self.handle_file(rest),
            "D" => self.handle_dir(rest),
            "E" => {
                if self.dirs.pop().is_some() {
                    self.ack();
                } else {
                    self.nak(2, "unexpected <E>");
                    self.phase = Phase::Dead;
                }
            }
            _ => {
                self.nak(2, &format!("protocol error: unexpected {line:?}"));
                self.phase = Phase::Dead;
            }
        }
    }

    fn parse_header(rest: &str) -> Option<(u32, u64, &str)> {
        let mut parts = rest.splitn(3, ' ');
        let mode = u32::from_str_radix(parts.next()?, 8).ok()?;
        let size = parts.next()?.parse().ok()?;
        let name = parts.next()?;
        Some((mode, size, name))
    }

    fn handle_file(&mut self, rest: &str) {
        let Some((mode, size, name)) = Self::parse_header(rest) else {
            self.nak(2, "protocol error: bad file header");
            self.phase = Phase::Dead;
            return;
        };
        if self.reject_names.contains(name) {
            self.nak(1, &format!("{name}: Permission denied"));
            return;
        }
        let dest = self.destination(name);
        let parent_ok = match dest.rsplit_once('/') {
            Some((parent, _)) => parent.is_empty() || self.tree.is_dir(parent),
            None => true,
        };
        if !parent_ok {
            self.nak(1, &format!("{dest}: No such file or directory"));
            return;
        }
        self.ack();
        self.phase = Phase::Payload {
            dest,
            mode,
            remaining: size,
            data: Vec::new(),
        };
        if size == 0 {
            self.to_terminator();
        }
    }

    fn handle_dir(&mut self, rest: &str) {
        let Some((mode, _, name)) = Self::parse_header(rest) else {
            self.nak(2, "protocol error: bad directory header");
            self.phase = Phase::Dead;
            return;
        };
        if !self.recursive {
            self.nak(2, "received directory without -r");
            self.phase = Phase::Dead;
            return;
        }
        if self.reject_names.contains(name) {
            self.nak(1, &format!("{name}: Permission denied"));
            return;
        }
        let dest = self.destination(name);
        let result = match self.tree.get_mut(&dest) {
            Some(Node::Dir { mode: existing, .. }) => {
                *existing = mode;
                Ok(())
            }
            Some(Node::File { .. }) => Err(format!("{dest}: Not a directory")),
            None => self.tree.put(
                &dest,
                Node::Dir {
                    mode,
                    children: BTreeMap::new(),
                },
            ),
        };
        match result {
            Ok(()) => {
                self.dirs.push(dest);
                self.ack();
            }
            Err(reason) => self.nak(1, &reason),
        }
    }
}

/// Undo the shell quoting applied to the remote command.
fn split_command(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ' ' => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            other => {
                in_word = true;
                current.push(other);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct EmulatedSession {
    state: Rc<RefCell<SinkState>>,
}

impl EmulatedSession {
    pub fn new(tree: RemoteTree) -> Self {
        Self {
            state: Rc::new(RefCell::new(SinkState {
                tree,
                command: None,
                reject_names: HashSet::new(),
                refuse_start: false,
                target: String::new(),
                recursive: false,
                dirs: Vec::new(),
                pending: Vec::new(),
                phase: Phase::Line,
                replies: VecDeque::new(),
            })),
        }
    }

    /// A remote with an empty `/test` directory.
    pub fn with_test_dir() -> Self {
        let mut tree = RemoteTree::default();
        tree.mkdir_p("/test");
        Self::new(tree)
    }

    pub fn reject(&self, name: &str) {
        self.state.borrow_mut().reject_names.insert(name.to_string());
    }

    pub fn refuse_start(&self) {
        self.state.borrow_mut().refuse_start = true;
    }

    pub fn tree(&self) -> Ref<'_, RemoteTree> {
        Ref::map(self.state.borrow(), |s| &s.tree)
    }

    pub fn command(&self) -> Option<String> {
        self.state.borrow().command.clone()
    }
}

pub struct SinkWriter(Rc<RefCell<SinkState>>);

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().feed(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct SinkReader(Rc<RefCell<SinkState>>);

impl Read for SinkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.0.borrow_mut();
        let n = buf.len().min(state.replies.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.replies.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

impl ScpSession for EmulatedSession {
    type Outbound = SinkWriter;
    type Inbound = SinkReader;

    fn open_outbound(&mut self) -> io::Result<SinkWriter> {
        Ok(SinkWriter(self.state.clone()))
    }

    fn open_inbound(&mut self) -> io::Result<SinkReader> {
        Ok(SinkReader(self.state.clone()))
    }

    fn start(&mut self, command: &str) -> io::Result<()> {
        self.state.borrow_mut().start(command)
    }
}
