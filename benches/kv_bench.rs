use criterion::{criterion_group, criterion_main, Criterion};
use ember_kv::{
  db::Engine,
  option::Options,
  util::rand_kv::{get_test_key, get_test_value},
};
use rand::Rng;

fn bench_put(c: &mut Criterion) {
  let dir = tempfile::tempdir().unwrap();
  let mut option = Options::default();
  option.dir_path = dir.path().to_path_buf();
  let engine = Engine::open(option).unwrap();

  let mut rnd = rand::thread_rng();

  c.bench_function("ember-kv-put", |b| {
    b.iter(|| {
      let i = rnd.gen_range(0..u32::MAX) as usize;
      engine.put(get_test_key(i), get_test_value(i)).unwrap();
    })
  });
}

fn bench_get(c: &mut Criterion) {
  let dir = tempfile::tempdir().unwrap();
  let mut option = Options::default();
  option.dir_path = dir.path().to_path_buf();
  let engine = Engine::open(option).unwrap();

  for i in 0..100000 {
    engine.put(get_test_key(i), get_test_value(i)).unwrap();
  }

  let mut rnd = rand::thread_rng();

  c.bench_function("ember-kv-get", |b| {
    b.iter(|| {
      let i = rnd.gen_range(0..u32::MAX) as usize;
      let res = engine.get(get_test_key(i));
      if (0..100000).contains(&i) {
        assert!(res.is_ok());
      } else {
        assert!(res.is_err());
      }
    })
  });
}

fn bench_delete(c: &mut Criterion) {
  let dir = tempfile::tempdir().unwrap();
  let mut option = Options::default();
  option.dir_path = dir.path().to_path_buf();
  let engine = Engine::open(option).unwrap();

  for i in 0..100000 {
    engine.put(get_test_key(i), get_test_value(i)).unwrap();
  }

  let mut rnd = rand::thread_rng();

  c.bench_function("ember-kv-delete", |b| {
    b.iter(|| {
      let i = rnd.gen_range(0..u32::MAX) as usize;
      engine.delete(get_test_key(i)).unwrap();
    })
  });
}

fn bench_list_keys(c: &mut Criterion) {
  let dir = tempfile::tempdir().unwrap();
  let mut option = Options::default();
  option.dir_path = dir.path().to_path_buf();
  let engine = Engine::open(option).unwrap();

  for i in 0..100000 {
    engine.put(get_test_key(i), get_test_value(i)).unwrap();
  }

  c.bench_function("ember-kv-list-keys", |b| {
    b.iter(|| {
      engine.list_keys().unwrap();
    })
  });
}

fn bench_stat(c: &mut Criterion) {
  let dir = tempfile::tempdir().unwrap();
  let mut option = Options::default();
  option.dir_path = dir.path().to_path_buf();
  let engine = Engine::open(option).unwrap();

  for i in 0..100000 {
    engine.put(get_test_key(i), get_test_value(i)).unwrap();
  }

  c.bench_function("ember-kv-stat", |b| {
    b.iter(|| {
      engine.stat().unwrap();
    })
  });
}

criterion_group!(benches, bench_get, bench_put, bench_delete, bench_list_keys, bench_stat);
criterion_main!(benches);
