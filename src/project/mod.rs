//! The project model received from the editor.
//!
//! Serialization lives with the editor's protocol layer. The engine only
//! requires that a decoded project satisfies the data model invariants
//! before a compile is attempted, and that a failed decode leaves the
//! previously loaded project in place.

use serde::{Deserialize, Serialize};
use std::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub song: Song,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Song {
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: u64,
    pub name: String,

    /// The graph node generating this track's audio, if one has been
    /// created. Stored as the raw node id the engine assigned.
    #[serde(default)]
    pub generator_node: Option<u64>,
}

impl Project {
    pub fn from_json(serialized: &str) -> Result<Self, ProjectDecodeError> {
        serde_json::from_str(serialized).map_err(ProjectDecodeError)
    }

    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(serialized) => serialized,
            Err(e) => {
                log::error!("Failed to serialize project model: {}", e);
                String::new()
            }
        }
    }

    pub fn track(&self, id: u64) -> Option<&Track> {
        self.song.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: u64) -> Option<&mut Track> {
        self.song.tracks.iter_mut().find(|t| t.id == id)
    }

    /// Apply one incremental change to the in-memory model. A failed
    /// update leaves the model untouched.
    pub fn apply_update(&mut self, update: &ProjectUpdate) -> Result<(), ProjectUpdateError> {
        match update {
            ProjectUpdate::AddTrack { id, name } => {
                if self.track(*id).is_some() {
                    return Err(ProjectUpdateError::DuplicateTrack(*id));
                }

                self.song.tracks.push(Track {
                    id: *id,
                    name: name.clone(),
                    generator_node: None,
                });
            }
            ProjectUpdate::RemoveTrack { id } => {
                let index = self
                    .song
                    .tracks
                    .iter()
                    .position(|t| t.id == *id)
                    .ok_or(ProjectUpdateError::UnknownTrack(*id))?;

                self.song.tracks.remove(index);
            }
            ProjectUpdate::RenameTrack { id, name } => {
                let track =
                    self.track_mut(*id).ok_or(ProjectUpdateError::UnknownTrack(*id))?;

                track.name = name.clone();
            }
            ProjectUpdate::AddToneGenerator { track_id } => {
                // The graph side of this update happens in the engine's
                // command handler, which records the created node here.
                self.track(*track_id).ok_or(ProjectUpdateError::UnknownTrack(*track_id))?;
            }
        }

        Ok(())
    }
}

/// An incremental change to the project model, applied in place. Changes
/// that affect the graph's shape are reflected into the topology by the
/// engine before the next compile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProjectUpdate {
    AddTrack { id: u64, name: String },
    RemoveTrack { id: u64 },
    RenameTrack { id: u64, name: String },
    AddToneGenerator { track_id: u64 },
}

/// The incoming model could not be decoded. The engine keeps its
/// previous project state.
#[derive(Debug)]
pub struct ProjectDecodeError(serde_json::Error);

impl Error for ProjectDecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl std::fmt::Display for ProjectDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to decode project model: {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectUpdateError {
    UnknownTrack(u64),
    DuplicateTrack(u64),
}

impl Error for ProjectUpdateError {}

impl std::fmt::Display for ProjectUpdateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectUpdateError::UnknownTrack(id) => {
                write!(f, "the project has no track with id {}", id)
            }
            ProjectUpdateError::DuplicateTrack(id) => {
                write!(f, "the project already has a track with id {}", id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_project() {
        let project = Project::from_json(
            r#"{"id": 7, "song": {"tracks": [{"id": 1, "name": "Lead"}]}}"#,
        )
        .unwrap();

        assert_eq!(project.id, 7);
        assert_eq!(project.song.tracks.len(), 1);
        assert_eq!(project.song.tracks[0].name, "Lead");
        assert_eq!(project.song.tracks[0].generator_node, None);
    }

    #[test]
    fn decode_errors_are_descriptive() {
        let err = Project::from_json("{not json").unwrap_err();

        assert!(err.to_string().contains("failed to decode project model"));
    }

    #[test]
    fn updates_apply_in_place() {
        let mut project = Project { id: 1, song: Song::default() };

        project
            .apply_update(&ProjectUpdate::AddTrack { id: 1, name: "Drums".into() })
            .unwrap();
        project
            .apply_update(&ProjectUpdate::RenameTrack { id: 1, name: "Percussion".into() })
            .unwrap();

        assert_eq!(project.track(1).unwrap().name, "Percussion");

        assert_eq!(
            project.apply_update(&ProjectUpdate::RemoveTrack { id: 2 }),
            Err(ProjectUpdateError::UnknownTrack(2)),
        );

        project.apply_update(&ProjectUpdate::RemoveTrack { id: 1 }).unwrap();
        assert!(project.song.tracks.is_empty());
    }
}
