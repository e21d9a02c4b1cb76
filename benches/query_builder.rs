//! Benchmarks for building and compiling queries.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use quarry_orm::filter::FilterValue;
use quarry_orm::query::QueryBuilder;
use quarry_orm::sql::{Dialect, finalize};
use quarry_orm::types::SortOrder;

fn simple_query() -> QueryBuilder {
    QueryBuilder::table("users")
        .select(["id", "email"])
        .r#where("id", 42)
}

fn complex_query() -> QueryBuilder {
    QueryBuilder::table("users")
        .select(["users.id", "users.email", "posts.title"])
        .join("posts", "posts.user_id", "=", "users.id")
        .r#where("users.active", true)
        .where_nested(|q| q.r#where("role", "admin").or_where("role", "editor"))
        .where_not_null("users.verified_at")
        .where_between("users.age", 18, 65)
        .order_by("users.created_at", SortOrder::Desc)
        .limit(20)
        .offset(40)
}

fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("construction");

    group.bench_function("simple", |b| b.iter(|| black_box(simple_query())));
    group.bench_function("complex", |b| b.iter(|| black_box(complex_query())));

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let simple = simple_query();
    let complex = complex_query();

    for dialect in [Dialect::Sqlite, Dialect::Postgres, Dialect::MySql] {
        group.bench_with_input(BenchmarkId::new("simple", dialect.as_str()), &dialect, |b, d| {
            b.iter(|| black_box(simple.to_sql(*d)))
        });
        group.bench_with_input(BenchmarkId::new("complex", dialect.as_str()), &dialect, |b, d| {
            b.iter(|| black_box(complex.to_sql(*d)))
        });
    }

    group.finish();
}

fn bench_in_lists(c: &mut Criterion) {
    let mut group = c.benchmark_group("in_list");

    for size in [10usize, 100, 1000] {
        let values: Vec<FilterValue> = (0..size as i64).map(FilterValue::Int).collect();
        let query = QueryBuilder::table("posts").where_in("user_id", values);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("postgres", size), &query, |b, q| {
            b.iter(|| {
                let compiled = q.to_sql(Dialect::Postgres).unwrap_or_else(|e| panic!("{e}"));
                black_box(finalize(&compiled.sql, Dialect::Postgres))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_construction, bench_compile, bench_in_lists);
criterion_main!(benches);
