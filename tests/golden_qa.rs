//! Golden retrieval harness.
//!
//! Seeds a small labor-contract corpus, runs 50+ golden questions through
//! the fused retrieval pipeline, and checks Recall@K / MRR against the
//! quality floor.

use casearch::engine::Engine;
use casearch::extract::extract_from_raw_pages;
use casearch::indexer::{index_extracted, IndexOptions};
use casearch::qa::eval::{evaluate_retrieval, GoldenPair};
use casearch::Settings;

struct Topic {
    name: &'static str,
    page: &'static str,
    questions: &'static [&'static str],
    keywords: &'static [&'static str],
}

const TOPICS: &[Topic] = &[
    Topic {
        name: "sick leave",
        page: "ARTICLE 5 — SICK LEAVE\nEmployees are entitled to twelve (12) days of sick leave per year, accrued at one day per completed month of service. Sick leave may be used for personal illness, medical appointments, or care of an immediate family member.",
        questions: &[
            "What is the sick leave policy?",
            "How many sick days do employees receive each year?",
            "Can sick leave be used for medical appointments?",
            "How is sick leave accrued?",
        ],
        keywords: &["sick leave"],
    },
    Topic {
        name: "vacation",
        page: "ARTICLE 6 — VACATION\nVacation entitlement is two weeks after one year of service, three weeks after five years, and four weeks after ten years. Vacation pay is calculated at the employee's regular rate.",
        questions: &[
            "How many weeks of vacation after five years?",
            "What is the vacation entitlement?",
            "When do employees get four weeks of vacation?",
            "How is vacation pay calculated?",
        ],
        keywords: &["vacation"],
    },
    Topic {
        name: "overtime",
        page: "ARTICLE 7 — OVERTIME\nOvertime is paid at one and one half times the regular rate for hours worked beyond forty in a week, and double time beyond twelve hours in a day. Overtime must be authorized in advance.",
        questions: &[
            "What is the overtime rate?",
            "When does double time apply?",
            "How many hours before overtime is paid?",
            "Does overtime need authorization?",
        ],
        keywords: &["overtime"],
    },
    Topic {
        name: "grievance",
        page: "ARTICLE 9 — GRIEVANCE PROCEDURE\nA grievance must be presented within ten days of the incident. Step one is a meeting with the immediate supervisor; step two goes to the department head; unresolved grievances proceed to binding arbitration.",
        questions: &[
            "How do I file a grievance?",
            "What are the steps of the grievance procedure?",
            "What is the deadline to present a grievance?",
            "When does a grievance go to arbitration?",
        ],
        keywords: &["grievance"],
    },
    Topic {
        name: "seniority",
        page: "ARTICLE 10 — SENIORITY\nSeniority is defined as the length of continuous service with the employer. Seniority governs layoff, recall, promotion and vacation scheduling preferences.",
        questions: &[
            "How is seniority defined?",
            "What does seniority govern?",
            "Does seniority affect vacation scheduling?",
            "What is the seniority clause?",
        ],
        keywords: &["seniority"],
    },
    Topic {
        name: "probation",
        page: "ARTICLE 11 — PROBATION\nNew employees serve a probationary period of ninety calendar days. During probation an employee may be terminated without recourse to the grievance procedure.",
        questions: &[
            "How long is the probationary period?",
            "Can probationary employees grieve termination?",
            "What happens during probation?",
            "What is the probation clause?",
        ],
        keywords: &["probation"],
    },
    Topic {
        name: "layoff",
        page: "ARTICLE 13 — LAYOFF AND RECALL\nLayoffs occur in reverse order of seniority. Employees on layoff retain recall rights for twelve months and must respond to a recall notice within seven days.",
        questions: &[
            "What order are layoffs conducted in?",
            "How long do recall rights last?",
            "How quickly must an employee respond to recall?",
            "What are the layoff rules?",
        ],
        keywords: &["layoff", "recall"],
    },
    Topic {
        name: "benefits",
        page: "ARTICLE 15 — BENEFITS\nThe employer pays the full premium for extended health, dental coverage at eighty percent reimbursement, and vision care to a maximum of three hundred dollars every two years.",
        questions: &[
            "What dental coverage is provided?",
            "Who pays the benefit premiums?",
            "What is the vision care maximum?",
            "Describe the extended health benefits",
        ],
        keywords: &["dental", "health"],
    },
    Topic {
        name: "pension",
        page: "ARTICLE 16 — PENSION\nThe employer matches pension contributions at six percent of gross earnings. Employees are enrolled in the registered pension plan after completing probation.",
        questions: &[
            "What is the pension matching rate?",
            "When are employees enrolled in the pension plan?",
            "Describe the retirement plan contributions",
            "What is the pension clause?",
        ],
        keywords: &["pension"],
    },
    Topic {
        name: "safety",
        page: "ARTICLE 18 — SAFETY\nThe employer supplies all required personal protective equipment at no cost. A joint health and safety committee meets monthly and workplace hazards must be reported immediately.",
        questions: &[
            "Who pays for protective equipment?",
            "How often does the safety committee meet?",
            "What happens when a hazard is found?",
            "What does the safety article say?",
        ],
        keywords: &["safety", "protective equipment"],
    },
    Topic {
        name: "bereavement",
        page: "ARTICLE 19 — BEREAVEMENT LEAVE\nEmployees receive five days of paid bereavement leave for the death of an immediate family member and one day to attend the funeral of a close relative.",
        questions: &[
            "How many days of bereavement leave are provided?",
            "What is the bereavement policy?",
            "Is there leave to attend a funeral?",
            "What bereavement entitlement exists for immediate family?",
        ],
        keywords: &["bereavement"],
    },
    Topic {
        name: "wages",
        page: "SCHEDULE A — WAGES\nThe labourer classification starts at $28.50 per hour, operators at $31.00 per hour, and lead hands receive a premium of $1.25 per hour above their base classification rate.",
        questions: &[
            "What is the labourer hourly wage?",
            "How much do operators earn per hour?",
            "What premium do lead hands receive?",
            "Where are the wage rates listed?",
        ],
        keywords: &["labourer", "hour"],
    },
    Topic {
        name: "hours of work",
        page: "ARTICLE 8 — HOURS OF WORK\nThe regular work week is forty hours scheduled over five consecutive days. Shift schedules are posted fourteen days in advance and rest periods of fifteen minutes are provided each half shift.",
        questions: &[
            "What is the regular work week?",
            "How far in advance are schedules posted?",
            "How long are rest periods?",
        ],
        keywords: &["work week", "hours"],
    },
];

fn build_corpus() -> Engine {
    let engine = Engine::in_memory(Settings::default()).unwrap();
    for (i, topic) in TOPICS.iter().enumerate() {
        let path = format!("/tmp/golden_{i}.pdf");
        let filename = format!("golden_{i}.pdf");
        let id = engine
            .store()
            .insert_file(&path, &filename, &format!("hash-{i}"), 0.0, 1)
            .unwrap();
        let document = extract_from_raw_pages(&[topic.page.to_string()]);
        index_extracted(&engine, id, &document, &IndexOptions::default()).unwrap();
    }
    engine
}

fn golden_pairs() -> Vec<GoldenPair> {
    TOPICS
        .iter()
        .flat_map(|topic| {
            topic.questions.iter().map(move |question| GoldenPair {
                question: (*question).to_string(),
                expected_keywords: topic.keywords.iter().map(|k| (*k).to_string()).collect(),
                expected_topic: topic.name.to_string(),
            })
        })
        .collect()
}

#[test]
fn test_golden_corpus_size() {
    let pairs = golden_pairs();
    assert!(pairs.len() >= 50, "only {} golden pairs", pairs.len());
}

#[test]
fn test_golden_recall_and_mrr() {
    let engine = build_corpus();
    let pairs = golden_pairs();

    let summary = evaluate_retrieval(&engine, &pairs, 5);

    assert_eq!(summary.questions, pairs.len());
    assert!(
        summary.recall_at_5 >= 0.8,
        "Recall@5 {} below target; failures: {:?}",
        summary.recall_at_5,
        summary
            .results
            .iter()
            .filter(|r| r.first_hit_rank == 0 || r.first_hit_rank > 5)
            .map(|r| r.question.as_str())
            .collect::<Vec<_>>()
    );
    assert!(
        summary.mrr >= 0.5,
        "MRR {} below target",
        summary.mrr
    );
    assert!(summary.recall_at_1 <= summary.recall_at_3);
    assert!(summary.recall_at_3 <= summary.recall_at_5);
}

#[test]
fn test_golden_synonym_bridging() {
    // Questions phrased with synonyms still land on the canonical text
    let engine = build_corpus();
    let pairs = vec![
        GoldenPair {
            question: "how much sick time do employees get".to_string(),
            expected_keywords: vec!["sick leave".to_string()],
            expected_topic: "sick leave".to_string(),
        },
        GoldenPair {
            question: "what is the annual leave entitlement".to_string(),
            expected_keywords: vec!["vacation".to_string()],
            expected_topic: "vacation".to_string(),
        },
    ];

    let summary = evaluate_retrieval(&engine, &pairs, 5);
    assert!(
        summary.recall_at_5 >= 0.5,
        "synonym bridging recall {}",
        summary.recall_at_5
    );
}
