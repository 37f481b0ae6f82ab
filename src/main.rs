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

use std::collections::HashSet;

use log::{debug, error, info, warn};
use uuid::Uuid;

use examtt::config::{EngineConfig, SolverTemplate};
use examtt::io::{self, Dataset, MemoryDataSource};
use examtt::problem::Problem;
use examtt::sat::search::SearchModel;
use examtt::solution::SolutionStatus;
use examtt::solver::{schedule_session, CancellationToken, ScheduleError, TerminationReason};

// Exit codes of the schedule-session interface.
const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_DATASET_INVALID: i32 = 2;
const EXIT_INFEASIBLE: i32 = 3;
const EXIT_INTERNAL_ERROR: i32 = 4;

fn main() {
    let args = parse_cli_args();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(
            args.get_one::<String>("log_level")
                .map(|s| s.as_str())
                .unwrap_or("info"),
        ),
    )
    .init();
    info!(
        "This is the examtt exam timetabling engine, version {}",
        option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
    );

    let session_id: Uuid = {
        let raw: &String = args.get_one("session_id").unwrap();
        raw.parse().unwrap_or_else(|e| {
            error!("Could not parse session id {}: {}", raw, e);
            std::process::exit(EXIT_CONFIG_ERROR)
        })
    };

    let template_name = args
        .get_one::<String>("template")
        .map(|s| s.as_str())
        .unwrap_or("standard");
    let template: SolverTemplate = template_name.parse().unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(EXIT_CONFIG_ERROR)
    });
    let mut config = EngineConfig::from_template(template);

    if let Some(solver_time) = args.get_one::<u32>("solver_time") {
        config.cp_sat.phase1_time_limit_s = *solver_time;
    }
    if let Some(seed) = args.get_one::<u64>("seed") {
        config.ga.seed = *seed;
    }
    if let Some(retention) = args.get_one::<f64>("retention_threshold") {
        if !(0.0..=1.0).contains(retention) {
            error!("retention threshold must be in [0, 1], got {}", retention);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
        config.ga.retention_threshold = *retention;
    }
    if let Some(workers) = args.get_one::<u32>("num_workers") {
        config.cp_sat.num_workers = *workers;
    } else {
        config.cp_sat.num_workers = num_cpus::get() as u32;
    }

    // Read the dataset file up front: the CLI needs it for --limit-data and
    // for the optional human-readable printout.
    let inpath: &String = args.get_one("INPUT").unwrap();
    debug!("Opening input file {} ...", inpath);
    let file = std::fs::File::open(inpath).unwrap_or_else(|e| {
        error!("Could not open input file {}: {}", inpath, e);
        std::process::exit(EXIT_DATASET_INVALID)
    });
    let (mut dataset, stored_session) = io::simple::read(file).unwrap_or_else(|e| {
        error!("Could not read input file: {}", e);
        std::process::exit(EXIT_DATASET_INVALID)
    });
    if let Some(stored) = stored_session {
        if stored != session_id {
            error!(
                "Input file belongs to session {}, not {}",
                stored, session_id
            );
            std::process::exit(EXIT_DATASET_INVALID);
        }
    }
    if args.get_flag("limit_data") {
        limit_dataset(&mut dataset);
    }
    info!(
        "Found {} exams, {} rooms, {} days and {} students for session {}.",
        dataset.exams.len(),
        dataset.rooms.len(),
        dataset.days.len(),
        dataset.students.len(),
        session_id
    );

    if args.get_one::<String>("OUTPUT").is_none() && !args.get_flag("print") {
        warn!("No OUTPUT file and no --print option given. Solution will not be exported anywhere.");
    }

    let source = MemoryDataSource {
        session_id,
        dataset: dataset.clone(),
    };
    let mut sink: Box<dyn io::ResultSink> = match args.get_one::<String>("OUTPUT") {
        Some(outpath) => Box::new(io::simple::FileSink {
            path: outpath.into(),
        }),
        None => Box::new(io::MemorySink::default()),
    };

    let results = schedule_session(
        &source,
        &mut sink,
        session_id,
        config,
        template_name,
        SearchModel::new,
        CancellationToken::new(),
    );

    let results = match results {
        Ok(results) => results,
        Err(ScheduleError::Dataset(e)) => {
            error!("Dataset invalid: {}", e);
            std::process::exit(EXIT_DATASET_INVALID)
        }
        Err(ScheduleError::Source(e)) => {
            error!("Could not load dataset: {}", e);
            std::process::exit(EXIT_DATASET_INVALID)
        }
        Err(e) => {
            error!("Scheduling failed: {}", e);
            std::process::exit(EXIT_INTERNAL_ERROR)
        }
    };

    info!("Finished solving. {}", results.statistics);
    if let Some(quality) = &results.solution.quality {
        info!(
            "Solution quality: total {:.1}, completion {:.1}%, feasibility {:.1}",
            quality.total_score, quality.completion_percentage, quality.feasibility_score
        );
    }

    if args.get_flag("print") {
        // Rebuild the problem tables for display purposes only.
        let mut problem = Problem::from_dataset(dataset);
        problem.populate_exam_students().unwrap_or_else(|e| {
            error!("Could not prepare the timetable for display: {}", e);
            std::process::exit(EXIT_INTERNAL_ERROR)
        });
        problem.seal();
        print!(
            "The timetable is:\n{}",
            io::format_timetable(&results.solution, &problem)
        );
    }

    match (&results.termination, results.solution.status) {
        (TerminationReason::Error(message), _) => {
            error!("Internal error: {}", message);
            std::process::exit(EXIT_INTERNAL_ERROR)
        }
        (TerminationReason::Infeasible { reason }, _) => {
            warn!("No feasible timetable: {}", reason);
            std::process::exit(EXIT_INFEASIBLE)
        }
        (_, SolutionStatus::Optimal) | (_, SolutionStatus::Feasible) => {
            std::process::exit(exitcode::OK)
        }
        _ => std::process::exit(EXIT_INTERNAL_ERROR),
    }
}

/// Truncate an oversized dataset for quick trial runs: the first 100 exams
/// (in input order) and only the entities they reference.
fn limit_dataset(dataset: &mut Dataset) {
    const MAX_EXAMS: usize = 100;
    if dataset.exams.len() <= MAX_EXAMS {
        return;
    }
    dataset.exams.truncate(MAX_EXAMS);
    let kept_courses: HashSet<_> = dataset.exams.iter().map(|e| e.course_id).collect();
    dataset
        .registrations
        .retain(|r| kept_courses.contains(&r.course_id));
    let kept_students: HashSet<_> = dataset
        .registrations
        .iter()
        .map(|r| r.student_id)
        .collect();
    dataset.students.retain(|s| kept_students.contains(&s.id));
    warn!(
        "--limit-data: dataset truncated to {} exams, {} students",
        dataset.exams.len(),
        dataset.students.len()
    );
}

/// Helper function to construct and execute parser for command line options
fn parse_cli_args() -> clap::ArgMatches {
    clap::command!()
        .arg(
            clap::Arg::new("session_id")
                .short('s')
                .long("session-id")
                .help("Identifier of the scheduling session to solve")
                .value_name("UUID")
                .required(true),
        )
        .arg(
            clap::Arg::new("template")
                .short('t')
                .long("template")
                .help(
                    "Configuration template to start from: standard, emergency, \
                     exam_week, flexible or strict",
                )
                .value_name("TEMPLATE"),
        )
        .arg(
            clap::Arg::new("solver_time")
                .long("solver-time")
                .help("Wall-clock budget of the phase-1 feasibility solve, in seconds")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            clap::Arg::new("seed")
                .long("seed")
                .help("Seed of the genetic filter and ordering evolution")
                .value_name("N")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            clap::Arg::new("retention_threshold")
                .long("retention-threshold")
                .help(
                    "Upper bound on the fraction of room/slot variables kept \
                     after GA pruning (0..1)",
                )
                .value_name("R")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            clap::Arg::new("num_workers")
                .long("num-workers")
                .help("Worker count forwarded to the backend solver. Defaults to the CPU count.")
                .value_name("THREADS")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            clap::Arg::new("limit_data")
                .long("limit-data")
                .help("Truncate oversized datasets to a quick trial size")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("log_level")
                .long("log-level")
                .help("Log filter, e.g. info, debug or examtt=trace")
                .value_name("FILTER"),
        )
        .arg(
            clap::Arg::new("print")
                .short('p')
                .long("print")
                .help("Print the calculated timetable to stdout in a human readable format")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("INPUT")
                .help("Dataset file in the simple JSON format")
                .required(true)
                .index(1),
        )
        .arg(
            clap::Arg::new("OUTPUT")
                .help("File to write the solution to")
                .index(2),
        )
        .get_matches()
}
