//! Connection endpoints and message direction.

use std::fmt;

use serde::Serialize;

/// One side of an observed connection: process name plus pid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint
{
    /// Service name for remote peers, executable name for the local process.
    pub name: String,
    /// Process identifier.
    pub pid: i32,
}

impl Endpoint
{
    pub fn new(name: impl Into<String>, pid: i32) -> Self
    {
        Self { name: name.into(), pid }
    }
}

impl fmt::Display for Endpoint
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}({})", self.name, self.pid)
    }
}

/// Direction of a message relative to the instrumented process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction
{
    /// Delivered to the instrumented process.
    Inbound,
    /// Sent by the instrumented process.
    Outbound,
}

impl Direction
{
    /// Event label used on the wire (`received` / `sent`).
    pub fn event_kind(self) -> EventKind
    {
        match self {
            Direction::Inbound => EventKind::Received,
            Direction::Outbound => EventKind::Sent,
        }
    }
}

/// `event` field of an emitted capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind
{
    Received,
    Sent,
}
