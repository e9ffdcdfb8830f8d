use crate::client::DetectionResponse;
use crate::error::DetectionError;
use std::collections::HashMap;

/// Validate a response's per-class tally and return it ordered by first
/// occurrence in `detections`.
///
/// The tally is recomputed from the individual detections and compared
/// against the supplied `class_counts`; any disagreement (missing class,
/// extra class, count mismatch, or a `total_detections` that does not match
/// the detection list) rejects the whole response with `InconsistentTally`.
/// A misbehaving remote service is never silently trusted.
pub fn aggregate(response: &DetectionResponse) -> Result<Vec<(String, u32)>, DetectionError> {
    if response.total_detections as usize != response.detections.len() {
        return Err(DetectionError::InconsistentTally {
            details: format!(
                "total_detections is {} but {} detections were returned",
                response.total_detections,
                response.detections.len()
            ),
        });
    }

    let mut ordered: Vec<(String, u32)> = Vec::new();
    let mut recount: HashMap<&str, u32> = HashMap::new();
    for detection in &response.detections {
        let entry = recount.entry(detection.class_name.as_str()).or_insert(0);
        if *entry == 0 {
            ordered.push((detection.class_name.clone(), 0));
        }
        *entry += 1;
    }
    for (class_name, count) in &mut ordered {
        *count = recount[class_name.as_str()];
    }

    for (class_name, count) in &recount {
        match response.class_counts.get(*class_name) {
            Some(supplied) if supplied == count => {}
            Some(supplied) => {
                return Err(DetectionError::InconsistentTally {
                    details: format!(
                        "class '{}' counted {} but class_counts says {}",
                        class_name, count, supplied
                    ),
                });
            }
            None => {
                return Err(DetectionError::InconsistentTally {
                    details: format!("class '{}' missing from class_counts", class_name),
                });
            }
        }
    }
    for class_name in response.class_counts.keys() {
        if !recount.contains_key(class_name.as_str()) {
            return Err(DetectionError::InconsistentTally {
                details: format!(
                    "class_counts lists '{}' but no such detection exists",
                    class_name
                ),
            });
        }
    }

    Ok(ordered)
}
