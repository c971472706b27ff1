use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::ParseEnumError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Driver,
    Passenger,
    Both,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Driver => "DRIVER",
            UserRole::Passenger => "PASSENGER",
            UserRole::Both => "BOTH",
        }
    }

    pub fn can_drive(&self) -> bool {
        matches!(self, UserRole::Driver | UserRole::Both)
    }

    pub fn can_ride(&self) -> bool {
        matches!(self, UserRole::Passenger | UserRole::Both)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DRIVER" => Ok(UserRole::Driver),
            "PASSENGER" => Ok(UserRole::Passenger),
            "BOTH" => Ok(UserRole::Both),
            _ => Err(ParseEnumError::new("user role", s)),
        }
    }
}

/// A registered student.
///
/// The id lists are denormalized back-references written alongside the
/// owning ride, booking or rating. They are never read as a source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: UserRole,
    pub rides_offered: Vec<Uuid>,
    pub bookings: Vec<Uuid>,
    pub ratings_received: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(full_name: String, email: String, role: UserRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name,
            email,
            role,
            rides_offered: Vec::new(),
            bookings: Vec::new(),
            ratings_received: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
