// Copyright 2024 kisekifs
//
// JuiceFS, Copyright 2020 Juicedata, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use zforge_common::{chunk_marker_path, dsn::new_mem_object_storage, InputKey, ObjectStorage, ZMETADATA_KEY};
use zforge_recipe::{
    DatasetRecipe, Error, FileSequenceRecipe, JsonDecoder, RecipeBuilder, RecipeStage, Target,
};
use zforge_storage::{InputCache, OperatorCacheStore, OperatorSourceOpener};
use zforge_types::{DataType, Dataset, Variable, VariableEncoding};

const NUM_INPUTS: usize = 10;

fn key(i: usize) -> InputKey { InputKey::new(format!("inputs/sst_{i:03}.json")) }

fn keys() -> Vec<InputKey> { (0..NUM_INPUTS).map(key).collect() }

// One day of a fake sea surface temperature product: `times` along the
// growth dimension over a static two point latitude axis.
fn unit(times: &[usize]) -> Dataset {
    let n = times.len();
    let mut ds = Dataset::new();
    ds.attrs.insert("title".into(), "synthetic sst".into());
    let time: Vec<f64> = times.iter().map(|t| *t as f64).collect();
    ds.insert(
        "time",
        Variable::from_f64(vec!["time".into()], vec![n], DataType::I64, &time).unwrap(),
    )
    .unwrap();
    let sst: Vec<f64> = times.iter().flat_map(|t| [*t as f64 * 10.0, *t as f64 * 10.0 + 1.0]).collect();
    let sst = Variable::from_f64(vec!["time".into(), "lat".into()], vec![n, 2], DataType::F32, &sst)
        .unwrap()
        .with_encoding(VariableEncoding {
            fill_value: Some(-999.0),
        });
    ds.insert("sst", sst).unwrap();
    ds.insert(
        "lat",
        Variable::from_f64(vec!["lat".into()], vec![2], DataType::F64, &[-45.0, 45.0]).unwrap(),
    )
    .unwrap();
    ds
}

async fn source() -> ObjectStorage {
    zforge_utils::logger::install_fmt_log();
    let op = new_mem_object_storage("/source").unwrap();
    for i in 0..NUM_INPUTS {
        op.write(key(i).as_str(), JsonDecoder::encode(&unit(&[i])).unwrap())
            .await
            .unwrap();
    }
    op
}

fn direct_recipe(source: &ObjectStorage, target: &ObjectStorage) -> FileSequenceRecipe {
    RecipeBuilder::new(keys(), "time")
        .inputs_per_chunk(3)
        .target(target.clone())
        .source(Arc::new(OperatorSourceOpener::new(source.clone())))
        .build()
        .unwrap()
}

fn cached_recipe(
    source: &ObjectStorage,
    cache: &ObjectStorage,
    target: &ObjectStorage,
    require_cache: bool,
) -> FileSequenceRecipe {
    let cache = InputCache::new(
        Arc::new(OperatorSourceOpener::new(source.clone())),
        Arc::new(OperatorCacheStore::new(cache.clone())),
        require_cache,
    );
    RecipeBuilder::new(keys(), "time")
        .inputs_per_chunk(3)
        .target(target.clone())
        .input_cache(cache)
        .build()
        .unwrap()
}

async fn store_all(recipe: &FileSequenceRecipe, order: &[usize]) {
    for k in order {
        recipe.store_chunk(*k).await.unwrap();
    }
}

async fn assert_complete(target: &ObjectStorage) {
    let ds = Target::new(target.clone()).read_dataset().await.unwrap();
    let all: Vec<usize> = (0..NUM_INPUTS).collect();
    assert_eq!(ds, {
        let mut expected = unit(&all);
        // the store reports the default fill value of arrays that had none.
        for name in ["time", "lat"] {
            let var = expected.get(name).unwrap().clone().with_encoding(VariableEncoding {
                fill_value: Some(0.0),
            });
            expected.insert(name, var).unwrap();
        }
        expected
    });
}

#[tokio::test]
async fn full_lifecycle_with_cache() {
    let source = source().await;
    let cache = new_mem_object_storage("/cache").unwrap();
    let target = new_mem_object_storage("/target").unwrap();
    let recipe = cached_recipe(&source, &cache, &target, true);
    assert_eq!(recipe.stage(), RecipeStage::Uninitialized);

    recipe.prepare().await.unwrap();
    assert_eq!(recipe.stage(), RecipeStage::Prepared);

    let inputs: Vec<InputKey> = recipe.iter_inputs().collect();
    assert_eq!(inputs, keys());
    try_join_all(inputs.iter().map(|key| recipe.cache_input(key))).await.unwrap();
    assert_eq!(recipe.stage(), RecipeStage::Caching);

    // the source is no longer needed once everything is cached.
    source.remove_all("inputs/").await.unwrap();

    let chunks: Vec<usize> = recipe.iter_chunks().unwrap().collect();
    assert_eq!(chunks, vec![0, 1, 2, 3]);
    try_join_all(chunks.iter().map(|k| recipe.store_chunk(*k))).await.unwrap();
    assert_eq!(recipe.stage(), RecipeStage::Writing);

    recipe.finalize().await.unwrap();
    assert_eq!(recipe.stage(), RecipeStage::Finalized);
    assert_complete(&target).await;

    let meta = Target::new(target.clone()).open_existing().await.unwrap();
    let sst = meta.array("sst").unwrap();
    assert_eq!(sst.meta.shape, vec![10, 2]);
    assert_eq!(sst.meta.chunks, vec![3, 2]);
    let lat = meta.array("lat").unwrap();
    assert_eq!(lat.meta.shape, vec![2]);
    assert!(target.is_exist("sst/3.0").await.unwrap());
    assert!(!target.is_exist("sst/4.0").await.unwrap());
    // the last chunk holds one item padded with the fill value.
    let tail = target.read("sst/3.0").await.unwrap();
    assert_eq!(tail.len(), 3 * 2 * 4);
    assert_eq!(&tail[8..12], &(-999.0f32).to_le_bytes());

    // finalized recipes take no more writes.
    assert!(matches!(recipe.store_chunk(0).await, Err(Error::InvalidState { .. })));
    recipe.finalize().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chunks_stored_from_spawned_tasks() {
    let source = source().await;
    let target = new_mem_object_storage("/target").unwrap();
    let recipe = Arc::new(direct_recipe(&source, &target));
    recipe.prepare().await.unwrap();

    let tasks: Vec<_> = recipe
        .iter_chunks()
        .unwrap()
        .map(|k| {
            let recipe = recipe.clone();
            tokio::spawn(async move { recipe.store_chunk(k).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    tokio::spawn({
        let recipe = recipe.clone();
        async move { recipe.finalize().await }
    })
    .await
    .unwrap()
    .unwrap();
    assert_complete(&target).await;
}

#[tokio::test]
async fn finalize_reports_missing_chunks() {
    let source = source().await;
    let target = new_mem_object_storage("/target").unwrap();
    let recipe = direct_recipe(&source, &target);
    recipe.prepare().await.unwrap();
    store_all(&recipe, &[0, 2]).await;

    let err = recipe.finalize().await.unwrap_err();
    assert_eq!(err.missing_chunks(), Some(&[1, 3][..]));
    assert_eq!(recipe.stage(), RecipeStage::Writing);

    // another worker completes the work and finalizes.
    let other = direct_recipe(&source, &target);
    other.prepare().await.unwrap();
    store_all(&other, &[3, 1]).await;
    other.finalize().await.unwrap();
    recipe.finalize().await.unwrap();
    assert_complete(&target).await;
}

#[tokio::test]
async fn lifecycle_order_is_enforced() {
    let source = source().await;
    let target = new_mem_object_storage("/target").unwrap();
    let recipe = direct_recipe(&source, &target);

    assert!(matches!(recipe.store_chunk(0).await, Err(Error::InvalidState { .. })));
    assert!(matches!(recipe.iter_chunks(), Err(Error::InvalidState { .. })));
    assert!(matches!(recipe.finalize().await, Err(Error::InvalidState { .. })));

    recipe.prepare().await.unwrap();
    // recipes reading straight from the source have nothing to cache.
    assert_eq!(recipe.iter_inputs().count(), 0);
    assert!(matches!(recipe.cache_input(&key(0)).await, Err(Error::NotSupported { .. })));
    assert!(recipe.store_chunk(4).await.unwrap_err().is_unknown_chunk());

    let cache = new_mem_object_storage("/cache").unwrap();
    let cached = cached_recipe(&source, &cache, &target, false);
    cached.prepare().await.unwrap();
    cached.store_chunk(0).await.unwrap();
    // caching is over once writing started.
    assert!(matches!(cached.cache_input(&key(0)).await, Err(Error::InvalidState { .. })));
    // prepare never moves a recipe backwards.
    cached.prepare().await.unwrap();
    assert_eq!(cached.stage(), RecipeStage::Writing);
}

#[tokio::test]
async fn prepare_is_idempotent() {
    let source = source().await;
    let target = new_mem_object_storage("/target").unwrap();
    let recipe = direct_recipe(&source, &target);
    recipe.prepare().await.unwrap();
    let first = target.read(ZMETADATA_KEY).await.unwrap();
    recipe.store_chunk(1).await.unwrap();
    let chunk = target.read("sst/1.0").await.unwrap();

    // a late worker preparing again must not touch metadata or data.
    let late = direct_recipe(&source, &target);
    late.prepare().await.unwrap();
    recipe.prepare().await.unwrap();
    assert_eq!(target.read(ZMETADATA_KEY).await.unwrap(), first);
    assert_eq!(target.read("sst/1.0").await.unwrap(), chunk);

    // concurrent initializers agree.
    let fresh = new_mem_object_storage("/fresh").unwrap();
    let workers: Vec<_> = (0..4).map(|_| direct_recipe(&source, &fresh)).collect();
    let results = join_all(workers.iter().map(|r| r.prepare())).await;
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(fresh.read(ZMETADATA_KEY).await.unwrap(), first);
}

#[tokio::test]
async fn store_chunk_is_idempotent() {
    let source = source().await;
    let target = new_mem_object_storage("/target").unwrap();
    let recipe = direct_recipe(&source, &target);
    recipe.prepare().await.unwrap();

    recipe.store_chunk(2).await.unwrap();
    let first = target.read("sst/2.0").await.unwrap();
    let marker = target.read(&chunk_marker_path(2)).await.unwrap();
    recipe.store_chunk(2).await.unwrap();
    assert_eq!(target.read("sst/2.0").await.unwrap(), first);
    assert_eq!(target.read(&chunk_marker_path(2)).await.unwrap(), marker);
    // only the store chunks of the region were written.
    assert!(!target.is_exist("sst/1.0").await.unwrap());
    assert!(!target.is_exist("sst/3.0").await.unwrap());
}

#[tokio::test]
async fn out_of_order_writes_match_in_order_writes() {
    let source = source().await;
    let in_order = new_mem_object_storage("/in-order").unwrap();
    let shuffled = new_mem_object_storage("/shuffled").unwrap();

    let a = direct_recipe(&source, &in_order);
    a.prepare().await.unwrap();
    store_all(&a, &[0, 1, 2, 3]).await;
    a.finalize().await.unwrap();

    let b = direct_recipe(&source, &shuffled);
    b.prepare().await.unwrap();
    store_all(&b, &[3, 1, 0, 2]).await;
    b.finalize().await.unwrap();

    for path in ["sst/0.0", "sst/1.0", "sst/2.0", "sst/3.0", "time/3", "lat/0", ZMETADATA_KEY] {
        assert_eq!(
            in_order.read(path).await.unwrap(),
            shuffled.read(path).await.unwrap(),
            "{path}"
        );
    }
    assert_complete(&shuffled).await;
}

#[tokio::test]
async fn partial_initialization_is_redone() {
    let source = source().await;
    let target = new_mem_object_storage("/target").unwrap();
    // an initializer died after writing some of the schema.
    target.write(".zgroup", b"{\"zarr_format\": 2}".to_vec()).await.unwrap();
    target.write("sst/.zarray", b"{ half a document".to_vec()).await.unwrap();

    let recipe = direct_recipe(&source, &target);
    recipe.prepare().await.unwrap();
    store_all(&recipe, &[0, 1, 2, 3]).await;
    recipe.finalize().await.unwrap();
    assert_complete(&target).await;
}

#[tokio::test]
async fn corrupt_consolidated_metadata_is_fatal() {
    let source = source().await;
    let target = new_mem_object_storage("/target").unwrap();
    target.write(ZMETADATA_KEY, b"not json".to_vec()).await.unwrap();

    let recipe = direct_recipe(&source, &target);
    let err = recipe.prepare().await.unwrap_err();
    assert!(matches!(err, Error::InvalidMetadata { .. }), "{err}");
    assert!(!err.is_not_found());
    assert_eq!(recipe.stage(), RecipeStage::Uninitialized);
    assert!(!target.is_exist("sst/.zarray").await.unwrap());
}

#[tokio::test]
async fn wrong_size_units_are_rejected() {
    let source = source().await;
    // inputs hold one item each, but the recipe claims two.
    let target = new_mem_object_storage("/target").unwrap();
    let recipe = RecipeBuilder::new(keys(), "time")
        .inputs_per_chunk(3)
        .items_per_input(2)
        .target(target.clone())
        .source(Arc::new(OperatorSourceOpener::new(source.clone())))
        .build()
        .unwrap();
    recipe.prepare().await.unwrap();
    let err = recipe.store_chunk(1).await.unwrap_err();
    assert!(matches!(err, Error::RegionWrite { .. }), "{err}");
    assert!(!Target::new(target.clone()).is_chunk_complete(1).await.unwrap());

    // an input that does not carry the growth dimension at all.
    source
        .write(key(4).as_str(), br#"{ "variables": { "lat": { "dims": ["lat"], "dtype": "f64", "values": [1, 2] } } }"#.to_vec())
        .await
        .unwrap();
    let target = new_mem_object_storage("/other").unwrap();
    let recipe = direct_recipe(&source, &target);
    recipe.prepare().await.unwrap();
    assert!(matches!(recipe.store_chunk(1).await, Err(Error::Dataset { .. })));
}

#[tokio::test]
async fn require_cache_refuses_uncached_inputs() {
    let source = source().await;
    let cache = new_mem_object_storage("/cache").unwrap();
    let target = new_mem_object_storage("/target").unwrap();
    let recipe = cached_recipe(&source, &cache, &target, true);
    recipe.prepare().await.unwrap();

    let err = recipe.store_chunk(1).await.unwrap_err();
    assert!(err.is_cache_miss(), "{err}");

    for key in recipe.planner().inputs_for_chunk(1).unwrap().to_vec() {
        recipe.cache_input(&key).await.unwrap();
    }
    recipe.store_chunk(1).await.unwrap();

    // without the policy an uncached input is read from the source.
    let lenient = cached_recipe(&source, &new_mem_object_storage("/empty").unwrap(), &target, false);
    lenient.prepare().await.unwrap();
    lenient.store_chunk(2).await.unwrap();

    let missing = new_mem_object_storage("/missing").unwrap();
    let broken = direct_recipe(&missing, &new_mem_object_storage("/t2").unwrap());
    assert!(broken.prepare().await.unwrap_err().is_source_unavailable());
}
