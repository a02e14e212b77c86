// Pipeline graph - fixed task DAG for promo video assembly
use crate::models::JobStatus;
use std::collections::HashSet;

pub const SELECT_PAIRS: &str = "select_pairs";
pub const CREATE_CLIP_JOBS: &str = "create_clip_jobs";
pub const GENERATE_CLIPS: &str = "generate_clips";
pub const BUILD_SOUNDTRACK: &str = "build_soundtrack";
pub const CONCAT_CLIPS: &str = "concat_clips";
pub const MERGE_AUDIO: &str = "merge_audio";
pub const STORE_OUTPUT: &str = "store_output";

/// One task in the pipeline and the tasks whose outputs it needs.
#[derive(Debug)]
pub struct TaskSpec {
    pub name: &'static str,
    pub depends_on: &'static [&'static str],
}

/// The pipeline shape. The table is in dependency order: every task's
/// dependencies appear earlier in the table, which is what makes it a DAG.
///
/// generate_clips fans out into the soundtrack and video-concat branches,
/// which run concurrently and join at merge_audio.
pub const PIPELINE: &[TaskSpec] = &[
    TaskSpec {
        name: SELECT_PAIRS,
        depends_on: &[],
    },
    TaskSpec {
        name: CREATE_CLIP_JOBS,
        depends_on: &[SELECT_PAIRS],
    },
    TaskSpec {
        name: GENERATE_CLIPS,
        depends_on: &[CREATE_CLIP_JOBS],
    },
    TaskSpec {
        name: BUILD_SOUNDTRACK,
        depends_on: &[GENERATE_CLIPS],
    },
    TaskSpec {
        name: CONCAT_CLIPS,
        depends_on: &[GENERATE_CLIPS],
    },
    TaskSpec {
        name: MERGE_AUDIO,
        depends_on: &[BUILD_SOUNDTRACK, CONCAT_CLIPS],
    },
    TaskSpec {
        name: STORE_OUTPUT,
        depends_on: &[MERGE_AUDIO],
    },
];

pub fn task_names() -> Vec<&'static str> {
    PIPELINE.iter().map(|t| t.name).collect()
}

/// Check the table is well formed: unique names, dependencies declared
/// earlier in the table.
pub fn validate() -> Result<(), String> {
    let mut seen: HashSet<&str> = HashSet::new();
    for task in PIPELINE {
        for dep in task.depends_on {
            if !seen.contains(dep) {
                return Err(format!(
                    "Task '{}' depends on '{}' which is not declared before it",
                    task.name, dep
                ));
            }
        }
        if !seen.insert(task.name) {
            return Err(format!("Duplicate task name '{}'", task.name));
        }
    }
    Ok(())
}

/// Tasks whose dependencies are all completed and which have not themselves
/// completed or been stopped. A failed task never reappears here, and nothing
/// downstream of it ever becomes ready.
pub fn ready_tasks(
    completed: &HashSet<String>,
    stopped: &HashSet<String>,
) -> Vec<&'static TaskSpec> {
    PIPELINE
        .iter()
        .filter(|t| !completed.contains(t.name) && !stopped.contains(t.name))
        .filter(|t| t.depends_on.iter().all(|d| completed.contains(*d)))
        .collect()
}

/// Job status shown while a given task is running. The two parallel branches
/// race on this column; whichever wrote last wins, which is fine for a purely
/// informational field.
pub fn job_status_for(task_name: &str) -> Option<JobStatus> {
    match task_name {
        SELECT_PAIRS => Some(JobStatus::SelectingAssets),
        CREATE_CLIP_JOBS | GENERATE_CLIPS => Some(JobStatus::GeneratingClips),
        BUILD_SOUNDTRACK => Some(JobStatus::BuildingAudio),
        CONCAT_CLIPS => Some(JobStatus::CombiningVideo),
        MERGE_AUDIO => Some(JobStatus::MergingAudio),
        _ => None,
    }
}
