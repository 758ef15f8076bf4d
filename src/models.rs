use std::fmt;
use std::path::PathBuf;

// raw crontab lines, each keeping its trailing newline (if any)
// no crontab at all is None, which is not the same as an empty list
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskList {
    lines: Vec<Vec<u8>>,
}

pub type Snapshot = TaskList;

impl TaskList {
    // crontabs are not guaranteed to be UTF-8, so everything stays bytes
    pub fn from_bytes(content: &[u8]) -> Self {
        Self {
            lines: content.split_inclusive(|b| *b == b'\n').map(<[u8]>::to_vec).collect(),
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    pub fn lines(&self) -> &[Vec<u8>] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.lines.concat()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Install(PathBuf),
    Edit,
    List,
    Remove,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Install(source) => write!(f, "install from {}", source.display()),
            Action::Edit => write!(f, "edit"),
            Action::List => write!(f, "list"),
            Action::Remove => write!(f, "remove"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditOutcome {
    pub status: i32,
    pub stderr: String,
    pub changed: bool,
}

impl EditOutcome {
    pub fn needs_sync(&self) -> bool {
        self.status == 0 && self.changed
    }
}
