// Copyright 2026 by the examtt authors
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except in compliance with
// the License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! The simple JSON dataset and solution format (canonical serde_json
//! serialization of the entity records, wrapped in a format/version
//! envelope).

use std::path::PathBuf;

use serde_json::json;
use uuid::Uuid;

use super::{DataSource, Dataset, ResultSink, SinkError, SourceError};
use crate::solution::{Solution, SolutionMetadata};

const DATASET_FORMAT: &str = "X-examtt-dataset";
const SOLUTION_FORMAT: &str = "X-examtt-solution";

/// Read a dataset from the simple JSON representation.
pub fn read<R: std::io::Read>(reader: R) -> Result<(Dataset, Option<Uuid>), SourceError> {
    let mut data: serde_json::Value =
        serde_json::from_reader(reader).map_err(|e| SourceError::Unreadable {
            reason: e.to_string(),
        })?;
    if data["format"] != DATASET_FORMAT {
        return Err(SourceError::Unreadable {
            reason: format!("unexpected format tag {}", data["format"]),
        });
    }
    let session_id: Option<Uuid> = serde_json::from_value(data["session_id"].take()).ok();
    let dataset: Dataset =
        serde_json::from_value(data["dataset"].take()).map_err(|e| SourceError::Unreadable {
            reason: e.to_string(),
        })?;
    Ok((dataset, session_id))
}

/// Write a dataset in the simple JSON representation.
pub fn write_dataset<W: std::io::Write>(
    writer: W,
    dataset: &Dataset,
    session_id: Uuid,
) -> Result<(), String> {
    let data = json!({
        "format": DATASET_FORMAT,
        "version": "1.0",
        "session_id": session_id,
        "dataset": serde_json::to_value(dataset).map_err(|e| e.to_string())?,
    });
    serde_json::to_writer_pretty(writer, &data).map_err(|e| e.to_string())
}

/// Write a solution with its metadata in the simple JSON representation.
pub fn write_solution<W: std::io::Write>(
    writer: W,
    solution: &Solution,
    metadata: &SolutionMetadata,
) -> Result<(), String> {
    let data = json!({
        "format": SOLUTION_FORMAT,
        "version": "1.0",
        "metadata": serde_json::to_value(metadata).map_err(|e| e.to_string())?,
        "solution": serde_json::to_value(solution).map_err(|e| e.to_string())?,
    });
    serde_json::to_writer_pretty(writer, &data).map_err(|e| e.to_string())
}

/// Data source backed by a simple-format JSON file.
pub struct FileDataSource {
    pub path: PathBuf,
}

impl DataSource for FileDataSource {
    fn get_dataset(&self, session_id: Uuid) -> Result<Dataset, SourceError> {
        let file = std::fs::File::open(&self.path).map_err(|e| SourceError::Unreadable {
            reason: format!("{}: {}", self.path.display(), e),
        })?;
        let (dataset, stored_session) = read(file)?;
        // A file that names a session only serves that session.
        if let Some(stored) = stored_session {
            if stored != session_id {
                return Err(SourceError::NotFound { session_id });
            }
        }
        Ok(dataset)
    }
}

/// Result sink writing one solution file per persist call.
pub struct FileSink {
    pub path: PathBuf,
}

impl ResultSink for FileSink {
    fn persist(
        &mut self,
        solution: &Solution,
        metadata: &SolutionMetadata,
    ) -> Result<(), SinkError> {
        let file = std::fs::File::create(&self.path).map_err(|e| SinkError::Rejected {
            reason: format!("{}: {}", self.path.display(), e),
        })?;
        write_solution(file, solution, metadata)
            .map_err(|reason| SinkError::Rejected { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::DatasetBuilder;
    use chrono::NaiveDate;

    #[test]
    fn dataset_roundtrips_through_the_envelope() {
        let mut builder = DatasetBuilder::new(2, NaiveDate::from_ymd_opt(2026, 4, 13).unwrap());
        builder.exam("MTH101", crate::CourseId::new(), 30, 120);
        builder.room("HALL-A", 80, false);
        let dataset = builder.build();
        let session_id = Uuid::new_v4();

        let mut buffer = Vec::new();
        write_dataset(&mut buffer, &dataset, session_id).unwrap();
        let (back, stored_session) = read(&buffer[..]).unwrap();
        assert_eq!(stored_session, Some(session_id));
        assert_eq!(back.exams.len(), 1);
        assert_eq!(back.exams[0].course_code, "MTH101");
        assert_eq!(back.days.len(), 2);
        assert_eq!(back.timeslots.len(), 6);
    }

    #[test]
    fn wrong_format_tag_is_unreadable() {
        let data = br#"{"format": "something-else", "dataset": {}}"#;
        assert!(matches!(
            read(&data[..]),
            Err(SourceError::Unreadable { .. })
        ));
    }
}
