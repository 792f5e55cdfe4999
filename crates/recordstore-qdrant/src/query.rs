//! Request construction.
//!
//! Every request reads payloads; vectors are only requested when the caller
//! asked for them.

use std::collections::HashMap;

use qdrant_client::qdrant::condition::ConditionOneOf;
use qdrant_client::qdrant::vectors_config::Config;
use qdrant_client::qdrant::{
    Condition, CreateCollection, CreateCollectionBuilder, CreateFieldIndexCollection,
    CreateFieldIndexCollectionBuilder, DeletePoints, DeletePointsBuilder, Direction, Distance,
    FieldType, Filter, Fusion, GetPoints, GetPointsBuilder, OrderBy, PointId, PointStruct,
    PointsIdsList, PrefetchQueryBuilder, Query, QueryPoints, QueryPointsBuilder, ScrollPoints,
    ScrollPointsBuilder, SearchPoints, SearchPointsBuilder, UpsertPoints, UpsertPointsBuilder,
    VectorParamsBuilder, VectorParamsMap, VectorsConfig,
};
use recordstore_core::{DistanceFunction, PropertyType, RecordModel};

use crate::TRACING_TARGET_SEARCH;

/// Parameters shared by vector and hybrid searches.
#[derive(Debug, Clone)]
pub(crate) struct SearchParams<'a> {
    pub collection: &'a str,
    pub vector_name: Option<&'a str>,
    pub vector: Vec<f32>,
    pub top: usize,
    pub skip: usize,
    pub filter: Option<Filter>,
    pub include_vectors: bool,
}

pub(crate) fn search_request(params: SearchParams<'_>, score_threshold: Option<f64>) -> SearchPoints {
    let mut builder = SearchPointsBuilder::new(params.collection, params.vector, params.top as u64)
        .with_payload(true)
        .with_vectors(params.include_vectors);

    if let Some(name) = params.vector_name {
        builder = builder.vector_name(name);
    }
    if params.skip > 0 {
        builder = builder.offset(params.skip as u64);
    }
    if let Some(filter) = params.filter {
        builder = builder.filter(filter);
    }
    if let Some(threshold) = score_threshold {
        builder = builder.score_threshold(threshold as f32);
    }

    tracing::debug!(
        target: TRACING_TARGET_SEARCH,
        collection = %params.collection,
        top = params.top,
        skip = params.skip,
        "Built vector search request"
    );

    builder.build()
}

/// Builds a query that fuses a plain vector prefetch with a keyword-restricted
/// one using reciprocal rank fusion.
pub(crate) fn hybrid_request(
    params: SearchParams<'_>,
    text_field: &str,
    keywords: &[String],
) -> QueryPoints {
    let candidates = (params.top + params.skip) as u64;

    let keyword_match = Filter::should(
        keywords
            .iter()
            .map(|keyword| Condition::matches_text(text_field, keyword.clone())),
    );
    let keyword_filter = match &params.filter {
        Some(filter) => Filter::must([nested(filter.clone()), nested(keyword_match)]),
        None => keyword_match,
    };

    let prefetch = |filter: Option<Filter>| {
        let mut prefetch = PrefetchQueryBuilder::default()
            .query(Query::new_nearest(params.vector.clone()))
            .limit(candidates);
        if let Some(name) = params.vector_name {
            prefetch = prefetch.using(name);
        }
        if let Some(filter) = filter {
            prefetch = prefetch.filter(filter);
        }
        prefetch
    };

    let mut builder = QueryPointsBuilder::new(params.collection)
        .add_prefetch(prefetch(params.filter.clone()))
        .add_prefetch(prefetch(Some(keyword_filter)))
        .query(Query::new_fusion(Fusion::Rrf))
        .limit(params.top as u64)
        .with_payload(true)
        .with_vectors(params.include_vectors);

    if params.skip > 0 {
        builder = builder.offset(params.skip as u64);
    }

    tracing::debug!(
        target: TRACING_TARGET_SEARCH,
        collection = %params.collection,
        keywords = keywords.len(),
        top = params.top,
        "Built hybrid search request"
    );

    builder.build()
}

pub(crate) fn get_request(collection: &str, ids: Vec<PointId>, include_vectors: bool) -> GetPoints {
    GetPointsBuilder::new(collection, ids)
        .with_payload(true)
        .with_vectors(include_vectors)
        .build()
}

pub(crate) fn scroll_request(
    collection: &str,
    filter: Filter,
    limit: u32,
    offset: Option<PointId>,
    order_by: Option<OrderBy>,
    include_vectors: bool,
) -> ScrollPoints {
    let mut builder = ScrollPointsBuilder::new(collection)
        .filter(filter)
        .limit(limit)
        .with_payload(true)
        .with_vectors(include_vectors);

    if let Some(offset) = offset {
        builder = builder.offset(offset);
    }
    if let Some(order_by) = order_by {
        builder = builder.order_by(order_by);
    }

    builder.build()
}

pub(crate) fn order_by(storage_name: &str, ascending: bool) -> OrderBy {
    let direction = if ascending {
        Direction::Asc
    } else {
        Direction::Desc
    };

    OrderBy {
        key: storage_name.to_owned(),
        direction: Some(direction as i32),
        ..Default::default()
    }
}

pub(crate) fn upsert_request(collection: &str, points: Vec<PointStruct>) -> UpsertPoints {
    UpsertPointsBuilder::new(collection, points).wait(true).build()
}

pub(crate) fn delete_request(collection: &str, ids: Vec<PointId>) -> DeletePoints {
    DeletePointsBuilder::new(collection)
        .points(PointsIdsList { ids })
        .wait(true)
        .build()
}

/// Builds the collection creation request with one vector space per vector property.
pub(crate) fn create_collection_request(
    collection: &str,
    model: &RecordModel,
    has_named_vectors: bool,
) -> CreateCollection {
    let params = |dimensions: usize, distance: DistanceFunction| {
        VectorParamsBuilder::new(dimensions as u64, distance_of(distance)).build()
    };

    let config = if has_named_vectors {
        let map = model
            .vectors
            .iter()
            .map(|p| {
                (
                    p.storage_name.clone(),
                    params(p.dimensions, p.distance_function),
                )
            })
            .collect::<HashMap<_, _>>();
        Config::ParamsMap(VectorParamsMap { map })
    } else {
        // Models without named vectors always declare exactly one vector.
        let (dimensions, distance) = model
            .vectors
            .first()
            .map(|p| (p.dimensions, p.distance_function))
            .unwrap_or((1, DistanceFunction::Cosine));
        Config::Params(params(dimensions, distance))
    };

    CreateCollectionBuilder::new(collection)
        .vectors_config(VectorsConfig {
            config: Some(config),
        })
        .build()
}

/// Builds payload index requests for indexed and full-text indexed data properties.
pub(crate) fn field_index_requests(
    collection: &str,
    model: &RecordModel,
) -> Vec<CreateFieldIndexCollection> {
    let mut requests = Vec::new();

    for property in &model.data {
        if property.is_indexed
            && let Some(field_type) = field_type_of(property.property_type)
        {
            requests.push(
                CreateFieldIndexCollectionBuilder::new(
                    collection,
                    property.storage_name.clone(),
                    field_type,
                )
                .wait(true)
                .build(),
            );
        }

        if property.is_full_text_indexed {
            requests.push(
                CreateFieldIndexCollectionBuilder::new(
                    collection,
                    property.storage_name.clone(),
                    FieldType::Text,
                )
                .wait(true)
                .build(),
            );
        }
    }

    requests
}

fn distance_of(distance: DistanceFunction) -> Distance {
    match distance {
        DistanceFunction::Cosine => Distance::Cosine,
        DistanceFunction::DotProduct => Distance::Dot,
        DistanceFunction::Euclidean => Distance::Euclid,
    }
}

fn field_type_of(property_type: PropertyType) -> Option<FieldType> {
    match property_type {
        PropertyType::String | PropertyType::StringArray | PropertyType::Uuid => {
            Some(FieldType::Keyword)
        }
        PropertyType::Int32 | PropertyType::Int64 | PropertyType::UInt64 | PropertyType::Int64Array => {
            Some(FieldType::Integer)
        }
        PropertyType::Float32 | PropertyType::Float64 | PropertyType::Float64Array => {
            Some(FieldType::Float)
        }
        PropertyType::Bool => Some(FieldType::Bool),
        PropertyType::DateTime => Some(FieldType::Datetime),
        PropertyType::Object => None,
    }
}

fn nested(filter: Filter) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Filter(filter)),
    }
}
