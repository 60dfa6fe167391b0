use percent_encoding::percent_decode_str;
use std::fmt;

/// What an event announces a change of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Project,
    Package,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Project => "project",
            EventKind::Package => "package",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "project" => Some(EventKind::Project),
            "package" => Some(EventKind::Package),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sequence-numbered change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub seq: u64,
    pub kind: EventKind,
    pub project: String,
    pub package: Option<String>,
}

impl Event {
    pub fn project(seq: u64, project: impl Into<String>) -> Self {
        Self { seq, kind: EventKind::Project, project: project.into(), package: None }
    }

    pub fn package(seq: u64, project: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            seq,
            kind: EventKind::Package,
            project: project.into(),
            package: Some(package.into()),
        }
    }
}

/// Subscription filter `type/project[/package]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub kind: String,
    pub project: String,
    pub package: Option<String>,
}

impl EventFilter {
    pub fn new(kind: &str, project: &str, package: Option<&str>) -> Self {
        Self {
            kind: kind.to_string(),
            project: project.to_string(),
            package: package.map(str::to_string),
        }
    }

    /// Parse a `filter=` query value; components are percent-decoded
    pub fn parse(value: &str) -> Option<Self> {
        let parts: Vec<String> = value
            .split('/')
            .map(|p| percent_decode_str(p).decode_utf8_lossy().into_owned())
            .collect();
        match parts.as_slice() {
            [kind, project] => Some(Self::new(kind, project, None)),
            [kind, project, package, ..] => Some(Self::new(kind, project, Some(package))),
            _ => None,
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        if self.kind != event.kind.as_str() || self.project != event.project {
            return false;
        }
        match event.kind {
            EventKind::Project => true,
            EventKind::Package => match &self.package {
                None => true,
                Some(package) => event.package.as_deref() == Some(package.as_str()),
            },
        }
    }
}

/// In-memory snapshot of the event log; position `n` holds event `n`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Sequence number the next appended event will receive
    pub fn next_event(&self) -> u64 {
        self.events.len() as u64 + 1
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events after `start` that match any filter (all events if no filters)
    pub fn filtered(&self, start: u64, filters: &[EventFilter]) -> Vec<Event> {
        let skip = usize::try_from(start).unwrap_or(usize::MAX);
        self.events
            .iter()
            .skip(skip)
            .filter(|event| filters.is_empty() || filters.iter().any(|f| f.matches(event)))
            .cloned()
            .collect()
    }
}
