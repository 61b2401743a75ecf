use context_resume::context::{
    BudgetAllocator, ContextExtractor, ExtractionMode, HeuristicEstimator, PriorityClassifier,
    Role, SummaryRenderer, Transcript,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn build_transcript(turns: usize) -> Transcript {
    let estimator = HeuristicEstimator;
    let turns = (0..turns).map(|i| {
        let text = match i % 4 {
            0 => format!("Please fix the failing test in src/module_{i}.rs"),
            1 => format!("```rust\nfn handler_{i}() -> Result<()> {{\n    Ok(())\n}}\n```"),
            2 => "Error: thread 'main' panicked at index out of bounds".to_string(),
            _ => "Sounds good, I will keep going with the rest of the changes.".repeat(3),
        };
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        (role, None, text)
    });
    Transcript::from_turns("bench", turns, &estimator)
}

/// Classification, selection and rendering across transcript sizes
fn benchmark_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extraction");

    for size in [100usize, 1_000, 5_000] {
        let transcript = build_transcript(size);
        let budget = (transcript.total_tokens() / 3) as i64;

        group.bench_with_input(BenchmarkId::new("classify", size), &transcript, |b, t| {
            let classifier = PriorityClassifier::default();
            b.iter(|| classifier.classify(black_box(t)));
        });

        group.bench_with_input(BenchmarkId::new("full_uncached", size), &transcript, |b, t| {
            b.iter(|| {
                let extractor = ContextExtractor::new(
                    PriorityClassifier::default(),
                    BudgetAllocator::default(),
                    SummaryRenderer::default(),
                );
                extractor.extract(black_box(t), budget, ExtractionMode::Full)
            });
        });

        // Re-invocation with a cached classification
        let extractor = ContextExtractor::default();
        group.bench_with_input(BenchmarkId::new("stats_cached", size), &transcript, |b, t| {
            b.iter(|| extractor.extract(black_box(t), budget, ExtractionMode::StatsOnly));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_extraction);
criterion_main!(benches);
