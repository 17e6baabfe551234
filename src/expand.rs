use serde_json::{json, Map, Value};
use std::sync::Arc;
use url::Url;

use crate::api::JsonLdProcessor;
use crate::context::{Container, Context, Direction, ProcessingMode, Term};
use crate::creation::ContextFlags;
use crate::error::{ErrorCode, JsonLdError, Result};
use crate::helper::{add_value, as_values, into_array, NodeKind};
use crate::iri::{is_absolute_iri, is_well_formed_language_tag};
use crate::keywords::{is_keyword, Keyword, VALUE_OBJECT_KEYS};
use crate::{BoxFuture, DocumentLoader};

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ExpandFlags {
    pub frame_expansion: bool,
    pub ordered: bool,
    /// Set while expanding the values of an index, id or type map.
    pub from_map: bool,
    /// Set while expanding the value of an `@list` entry; nested arrays
    /// become lists of their own.
    pub inside_list: bool,
}

impl ExpandFlags {
    fn nested(self) -> ExpandFlags {
        ExpandFlags {
            from_map: false,
            inside_list: false,
            ..self
        }
    }
}

/// What the per-entry loop needs besides the active context. Nested
/// entries reuse it with the nesting key as active property.
#[derive(Clone, Copy)]
struct EntryScope<'a> {
    active_property: Option<&'a str>,
    input_type: Option<&'a str>,
    type_scoped_context: &'a Context,
    base_url: Option<&'a Url>,
    flags: ExpandFlags,
}

fn error(code: ErrorCode, message: impl Into<String>) -> JsonLdError {
    JsonLdError::new(code, message)
}

fn expands_to(context: &Context, key: &str, keyword: &str) -> bool {
    context.expand_iri(key, false, true).as_deref() == Some(keyword)
}

fn concat(existing: Value, new: Value) -> Value {
    let mut items = into_array(existing);
    items.extend(into_array(new));
    Value::Array(items)
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

fn is_empty_map(value: &Value) -> bool {
    value.as_object().map_or(false, Map::is_empty)
}

fn is_array_of(value: &Value, check: fn(&Value) -> bool) -> bool {
    value.as_array().map_or(false, |items| items.iter().all(check))
}

fn property_name(active_property: Option<&str>) -> &str {
    active_property.unwrap_or("the top-level object")
}

// The reverse map only ever holds an object; anything else is replaced.
fn take_reverse_map(result: &mut Map<String, Value>) -> Map<String, Value> {
    match result.remove("@reverse") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn add_reverse(reverse_map: &mut Map<String, Value>, property: &str, items: Value) -> Result<()> {
    reverse_map
        .entry(property.to_owned())
        .or_insert_with(|| Value::Array(vec![]));

    for item in into_array(items) {
        if matches!(
            NodeKind::of(&item),
            NodeKind::ValueObject | NodeKind::ListObject
        ) {
            return Err(error(
                ErrorCode::InvalidReversePropertyValue,
                format!("reverse property {} has a value or list object as value", property),
            ));
        }

        add_value(reverse_map, property, item);
    }

    Ok(())
}

impl<'l, L: DocumentLoader> JsonLdProcessor<'l, L> {
    /// The expansion algorithm. `Value::Null` means the element was
    /// dropped.
    pub(crate) fn expand_element<'a>(
        &'a mut self,
        active_context: Arc<Context>,
        active_property: Option<&'a str>,
        element: &'a Value,
        base_url: Option<&'a Url>,
        mut flags: ExpandFlags,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            // 2
            if active_property == Some("@default") {
                flags.frame_expansion = false;
            }

            // 3
            let property_term = active_property.and_then(|p| active_context.terms.get(p).cloned());

            match element {
                Value::Null => Ok(Value::Null),

                // 5
                Value::Array(items) => {
                    let list_container = property_term
                        .as_ref()
                        .map_or(false, |t| t.has_container(Container::List));
                    let json_ld_10 = self.options.processing_mode == ProcessingMode::JsonLd10;

                    let mut result = vec![];
                    for item in items {
                        let expanded = self
                            .expand_element(active_context.clone(), active_property, item, base_url, flags)
                            .await?;

                        if json_ld_10
                            && list_container
                            && (expanded.is_array() || NodeKind::of(&expanded) == NodeKind::ListObject)
                        {
                            return Err(error(
                                ErrorCode::ListOfLists,
                                format!("{} holds a list of lists", property_name(active_property)),
                            ));
                        }

                        let expanded = if (list_container || flags.inside_list) && expanded.is_array() {
                            json!({ "@list": expanded })
                        } else {
                            expanded
                        };

                        match expanded {
                            Value::Array(values) => result.extend(values),
                            Value::Null => (),
                            other => result.push(other),
                        }
                    }

                    Ok(Value::Array(result))
                }

                Value::Object(map) => {
                    self.expand_object(active_context, active_property, property_term, map, base_url, flags)
                        .await
                }

                // 4
                scalar => {
                    let active_property = match active_property {
                        None | Some("@graph") => return Ok(Value::Null),
                        Some(property) => property,
                    };

                    let active_context = match property_term
                        .as_ref()
                        .and_then(|t| t.local_context.as_ref().map(|local| (t, local)))
                    {
                        Some((term, local)) => {
                            let processed = self
                                .process_context_with(
                                    &active_context,
                                    local,
                                    term.base_url.as_ref(),
                                    vec![],
                                    ContextFlags::default(),
                                )
                                .await?;
                            Arc::new(processed)
                        }
                        None => active_context,
                    };

                    Ok(self.expand_value(&active_context, active_property, scalar))
                }
            }
        })
    }

    /// The value expansion algorithm.
    pub(crate) fn expand_value(
        &mut self,
        active_context: &Context,
        active_property: &str,
        value: &Value,
    ) -> Value {
        let term = active_context.term(active_property);
        let type_mapping = term.and_then(|t| t.type_mapping.as_deref());

        if let (Some(mapping @ ("@id" | "@vocab")), Value::String(id)) = (type_mapping, value) {
            let id = self.expand_iri(active_context, id, true, mapping == "@vocab", ErrorCode::InvalidIdValue);
            return json!({ "@id": id });
        }

        let mut result = Map::new();
        result.insert("@value".to_owned(), value.clone());

        match type_mapping {
            Some(mapping) if !matches!(mapping, "@id" | "@vocab" | "@none") => {
                result.insert("@type".to_owned(), Value::String(mapping.to_owned()));
            }
            _ if value.is_string() => {
                let (language, direction) = match term {
                    Some(term) => (
                        term.language_mapping.or(active_context.language.as_ref()),
                        term.direction_mapping.or(active_context.direction.as_ref()).copied(),
                    ),
                    None => (active_context.language.as_ref(), active_context.direction),
                };

                if let Some(language) = language {
                    result.insert("@language".to_owned(), Value::String(language.clone()));
                }

                if let Some(direction) = direction {
                    result.insert("@direction".to_owned(), direction.as_str().into());
                }
            }
            _ => (),
        }

        Value::Object(result)
    }

    async fn expand_object(
        &mut self,
        mut active_context: Arc<Context>,
        active_property: Option<&str>,
        property_term: Option<Arc<Term>>,
        element: &Map<String, Value>,
        base_url: Option<&Url>,
        flags: ExpandFlags,
    ) -> Result<Value> {
        // 7
        if let Some(previous) = active_context.previous_context.clone() {
            let keeps_scope = flags.from_map
                || element.keys().any(|k| expands_to(&active_context, k, "@value"))
                || (element.len() == 1
                    && element.keys().any(|k| expands_to(&active_context, k, "@id")));

            if !keeps_scope {
                active_context = previous;
            }
        }

        // 8
        if let Some(term) = &property_term {
            if let Some(local) = &term.local_context {
                let flags = ContextFlags {
                    override_protected: true,
                    ..ContextFlags::default()
                };
                let processed = self
                    .process_context_with(&active_context, local, term.base_url.as_ref(), vec![], flags)
                    .await?;
                active_context = Arc::new(processed);
            }
        }

        // 9
        if let Some(local) = element.get("@context") {
            let processed = self
                .process_context_with(&active_context, local, base_url, vec![], ContextFlags::default())
                .await?;
            active_context = Arc::new(processed);
        }

        // 10, 11
        let type_scoped_context = active_context.clone();
        let mut type_keys: Vec<&String> = element
            .keys()
            .filter(|k| expands_to(&active_context, k, "@type"))
            .collect();
        type_keys.sort();

        for key in &type_keys {
            let mut types: Vec<&str> = as_values(&element[key.as_str()])
                .iter()
                .filter_map(Value::as_str)
                .collect();
            types.sort_unstable();

            for type_name in types {
                let term = match type_scoped_context.terms.get(type_name) {
                    Some(term) => term,
                    None => continue,
                };

                if let Some(local) = &term.local_context {
                    let flags = ContextFlags {
                        propagate: false,
                        ..ContextFlags::default()
                    };
                    let processed = self
                        .process_context_with(&active_context, local, term.base_url.as_ref(), vec![], flags)
                        .await?;
                    active_context = Arc::new(processed);
                }
            }
        }

        // 12
        let input_type = type_keys
            .first()
            .and_then(|key| as_values(&element[key.as_str()]).last())
            .and_then(Value::as_str)
            .and_then(|t| active_context.expand_iri(t, false, true));

        let mut result = Map::new();
        let scope = EntryScope {
            active_property,
            input_type: input_type.as_deref(),
            type_scoped_context: &type_scoped_context,
            base_url,
            flags,
        };

        // 13, 14
        self.expand_entries(&mut result, active_context, element, scope)
            .await?;

        finish_object(result, active_property, flags.frame_expansion)
    }

    fn expand_entries<'a>(
        &'a mut self,
        result: &'a mut Map<String, Value>,
        active_context: Arc<Context>,
        element: &'a Map<String, Value>,
        scope: EntryScope<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let EntryScope {
                active_property,
                input_type,
                type_scoped_context,
                base_url,
                flags,
            } = scope;
            let mode = self.options.processing_mode;
            let frame = flags.frame_expansion;
            let mut nests: Vec<&'a str> = vec![];

            let mut keys: Vec<&'a String> = element.keys().collect();
            if flags.ordered {
                keys.sort();
            }

            // 13
            for key in keys {
                let key = key.as_str();
                let value = &element[key];

                if key == "@context" {
                    continue;
                }

                let expanded_property = match self.expand_iri(&active_context, key, false, true, ErrorCode::InvalidIriMapping) {
                    Some(p) if p.contains(':') || is_keyword(&p) => p,
                    _ => {
                        if self.options.safe_mode {
                            self.warn(
                                ErrorCode::InvalidIriMapping,
                                format!("'{}' does not expand to an absolute IRI and is dropped", key),
                            );
                        }
                        continue;
                    }
                };

                if let Some(keyword) = Keyword::parse(&expanded_property) {
                    // 13.4.1
                    if active_property == Some("@reverse") {
                        return Err(error(
                            ErrorCode::InvalidReversePropertyMap,
                            format!("'{}' expands to a keyword inside @reverse", key),
                        ));
                    }

                    // 13.4.2
                    let may_repeat = keyword == Keyword::Included
                        || (keyword == Keyword::Type && mode != ProcessingMode::JsonLd10);
                    if result.contains_key(&expanded_property) && !may_repeat {
                        return Err(error(
                            ErrorCode::CollidingKeywords,
                            format!("more than one entry expands to {}", expanded_property),
                        ));
                    }

                    let expanded_value = match keyword {
                        // 13.4.3
                        Keyword::Id => match value {
                            Value::String(id) => self
                                .expand_iri(&active_context, id, true, false, ErrorCode::InvalidIdValue)
                                .map(|iri| if frame { json!([iri]) } else { Value::String(iri) }),
                            Value::Array(ids) if frame => {
                                let mut expanded = vec![];
                                for id in ids {
                                    let id = id.as_str().ok_or_else(|| {
                                        error(
                                            ErrorCode::InvalidIdValue,
                                            format!("@id array of '{}' must only hold strings", key),
                                        )
                                    })?;
                                    if let Some(iri) = self.expand_iri(&active_context, id, true, false, ErrorCode::InvalidIdValue) {
                                        expanded.push(Value::String(iri));
                                    }
                                }
                                Some(Value::Array(expanded))
                            }
                            Value::Object(map) if frame && map.is_empty() => Some(json!([value])),
                            _ => {
                                return Err(error(
                                    ErrorCode::InvalidIdValue,
                                    format!("invalid @id value {}", value),
                                ))
                            }
                        },

                        // 13.4.4
                        Keyword::Type => {
                            let invalid = || {
                                error(
                                    ErrorCode::InvalidTypeValue,
                                    format!("invalid @type value {}", value),
                                )
                            };

                            let expanded = match value {
                                Value::String(t) => self
                                    .expand_iri(type_scoped_context, t, true, true, ErrorCode::InvalidTypeValue)
                                    .map(Value::String),
                                Value::Array(types) => {
                                    let mut expanded = vec![];
                                    for t in types {
                                        let t = t.as_str().ok_or_else(invalid)?;
                                        if let Some(iri) = self.expand_iri(type_scoped_context, t, true, true, ErrorCode::InvalidTypeValue) {
                                            expanded.push(Value::String(iri));
                                        }
                                    }
                                    Some(Value::Array(expanded))
                                }
                                Value::Object(map) if frame && map.is_empty() => Some(value.clone()),
                                Value::Object(map) if frame => {
                                    let default = map
                                        .get("@default")
                                        .and_then(Value::as_str)
                                        .ok_or_else(invalid)?;
                                    let iri = self.expand_iri(type_scoped_context, default, true, true, ErrorCode::InvalidTypeValue);
                                    Some(json!({ "@default": iri }))
                                }
                                _ => return Err(invalid()),
                            };

                            // 13.4.4.5
                            match (result.get("@type"), expanded) {
                                (Some(existing), Some(new)) => Some(concat(existing.clone(), new)),
                                (_, new) => new,
                            }
                        }

                        // 13.4.5
                        Keyword::Graph => {
                            let expanded = self
                                .expand_element(active_context.clone(), Some("@graph"), value, base_url, flags.nested())
                                .await?;
                            Some(Value::Array(into_array(expanded)))
                        }

                        // 13.4.6
                        Keyword::Included => {
                            if mode == ProcessingMode::JsonLd10 {
                                continue;
                            }

                            let expanded = self
                                .expand_element(active_context.clone(), active_property, value, base_url, flags.nested())
                                .await?;
                            let expanded = into_array(expanded);
                            if expanded.iter().any(|v| !NodeKind::of(v).is_node()) {
                                return Err(error(
                                    ErrorCode::InvalidIncludedValue,
                                    format!("@included of {} holds something other than node objects", property_name(active_property)),
                                ));
                            }

                            Some(match result.get("@included") {
                                Some(existing) => concat(existing.clone(), Value::Array(expanded)),
                                None => Value::Array(expanded),
                            })
                        }

                        // 13.4.7
                        Keyword::Value => {
                            if input_type == Some("@json") {
                                if mode == ProcessingMode::JsonLd10 {
                                    return Err(error(
                                        ErrorCode::InvalidValueObjectValue,
                                        "JSON literals require json-ld-1.1",
                                    ));
                                }

                                Some(value.clone())
                            } else {
                                let allowed = is_scalar(value)
                                    || value.is_null()
                                    || (frame && (is_empty_map(value) || is_array_of(value, is_scalar)));
                                if !allowed {
                                    return Err(error(
                                        ErrorCode::InvalidValueObjectValue,
                                        format!("invalid @value {}", value),
                                    ));
                                }

                                // 13.4.7.4
                                if value.is_null() {
                                    result.insert("@value".to_owned(), Value::Null);
                                    continue;
                                }

                                Some(value.clone())
                            }
                        }

                        // 13.4.8
                        Keyword::Language => {
                            let allowed = value.is_string()
                                || (frame && (is_empty_map(value) || is_array_of(value, Value::is_string)));
                            if !allowed {
                                return Err(error(
                                    ErrorCode::InvalidLanguageTaggedString,
                                    format!("invalid @language value {}", value),
                                ));
                            }

                            match value {
                                Value::String(tag) => {
                                    let tag = tag.to_lowercase();
                                    if !is_well_formed_language_tag(&tag) {
                                        self.warn(
                                            ErrorCode::MalformedLanguageTag,
                                            format!("'{}' is not a well-formed language tag", tag),
                                        );
                                    }
                                    Some(if frame { json!([tag]) } else { Value::String(tag) })
                                }
                                other => Some(Value::Array(into_array(other.clone()))),
                            }
                        }

                        // 13.4.9
                        Keyword::Direction => {
                            if mode == ProcessingMode::JsonLd10 {
                                continue;
                            }

                            let valid = value.as_str().and_then(Direction::parse).is_some();
                            let allowed = valid
                                || (frame && (is_empty_map(value) || is_array_of(value, Value::is_string)));
                            if !allowed {
                                return Err(error(
                                    ErrorCode::InvalidBaseDirection,
                                    format!("invalid @direction value {}", value),
                                ));
                            }

                            Some(if frame {
                                Value::Array(into_array(value.clone()))
                            } else {
                                value.clone()
                            })
                        }

                        // 13.4.10
                        Keyword::Index => {
                            if !value.is_string() {
                                return Err(error(
                                    ErrorCode::InvalidIndexValue,
                                    format!("invalid @index value {}", value),
                                ));
                            }

                            Some(value.clone())
                        }

                        // 13.4.11
                        Keyword::List => {
                            if matches!(active_property, None | Some("@graph")) {
                                continue;
                            }

                            let list_flags = ExpandFlags {
                                inside_list: true,
                                ..flags.nested()
                            };
                            let expanded = self
                                .expand_element(active_context.clone(), active_property, value, base_url, list_flags)
                                .await?;
                            let expanded = into_array(expanded);

                            if mode == ProcessingMode::JsonLd10
                                && (as_values(value).iter().any(Value::is_array)
                                    || expanded.iter().any(|v| NodeKind::of(v) == NodeKind::ListObject))
                            {
                                return Err(error(
                                    ErrorCode::ListOfLists,
                                    format!("{} holds a list of lists", property_name(active_property)),
                                ));
                            }

                            Some(Value::Array(expanded))
                        }

                        // 13.4.12
                        Keyword::Set => Some(
                            self.expand_element(active_context.clone(), active_property, value, base_url, flags.nested())
                                .await?,
                        ),

                        // 13.4.13
                        Keyword::Reverse => {
                            if !value.is_object() {
                                return Err(error(
                                    ErrorCode::InvalidReverseValue,
                                    format!("@reverse must be an object, got {}", value),
                                ));
                            }

                            let expanded = self
                                .expand_element(active_context.clone(), Some("@reverse"), value, base_url, flags.nested())
                                .await?;

                            if let Value::Object(mut expanded) = expanded {
                                // 13.4.13.3
                                if let Some(Value::Object(doubly_reversed)) = expanded.remove("@reverse") {
                                    for (property, items) in doubly_reversed {
                                        add_value(result, &property, items);
                                    }
                                }

                                // 13.4.13.4
                                if !expanded.is_empty() {
                                    let mut reverse_map = take_reverse_map(result);
                                    for (property, items) in expanded {
                                        add_reverse(&mut reverse_map, &property, items)?;
                                    }
                                    result.insert("@reverse".to_owned(), Value::Object(reverse_map));
                                }
                            }

                            continue;
                        }

                        // 13.4.14
                        Keyword::Nest => {
                            nests.push(key);
                            continue;
                        }

                        // 13.4.15
                        framing if frame && framing.is_framing() => Some(
                            self.expand_element(
                                active_context.clone(),
                                Some(framing.as_str()),
                                value,
                                base_url,
                                flags.nested(),
                            )
                            .await?,
                        ),

                        _ => None,
                    };

                    // 13.4.16
                    if let Some(expanded_value) = expanded_value {
                        result.insert(expanded_property, expanded_value);
                    }

                    continue;
                }

                // 13.5
                let term = active_context.terms.get(key).cloned();
                let has = |container: Container| {
                    term.as_ref()
                        .map_or(false, |t| t.has_container(container))
                };

                let expanded_value = match (term.as_deref(), value) {
                    // 13.6
                    (Some(t), _) if t.type_mapping.as_deref() == Some("@json") => {
                        json!({ "@value": value.clone(), "@type": "@json" })
                    }

                    // 13.7
                    (Some(t), Value::Object(language_map)) if t.has_container(Container::Language) => {
                        self.expand_language_map(&active_context, t, key, language_map, flags.ordered)?
                    }

                    // 13.8
                    (Some(t), Value::Object(index_map))
                        if t.has_container(Container::Index)
                            || t.has_container(Container::Type)
                            || t.has_container(Container::Id) =>
                    {
                        self.expand_index_map(&active_context, t, key, index_map, base_url, flags)
                            .await?
                    }

                    // 13.9
                    _ => {
                        self.expand_element(active_context.clone(), Some(key), value, base_url, flags.nested())
                            .await?
                    }
                };

                // 13.10
                if expanded_value.is_null() {
                    continue;
                }

                // 13.11
                let mut expanded_value = expanded_value;
                if has(Container::List) && NodeKind::of(&expanded_value) != NodeKind::ListObject {
                    expanded_value = json!({ "@list": Value::Array(into_array(expanded_value)) });
                }

                // 13.12
                if has(Container::Graph) && !has(Container::Id) && !has(Container::Index) {
                    let graphs = into_array(expanded_value)
                        .into_iter()
                        .map(|ev| json!({ "@graph": Value::Array(into_array(ev)) }))
                        .collect();
                    expanded_value = Value::Array(graphs);
                }

                // 13.13
                if term.as_ref().map_or(false, |t| t.reverse) {
                    let mut reverse_map = take_reverse_map(result);
                    add_reverse(&mut reverse_map, &expanded_property, expanded_value)?;
                    result.insert("@reverse".to_owned(), Value::Object(reverse_map));
                } else {
                    add_value(result, &expanded_property, expanded_value);
                }
            }

            // 14
            if flags.ordered {
                nests.sort_unstable();
            }

            for nesting_key in nests {
                let nest_term = active_context.terms.get(nesting_key).cloned();

                for nested in as_values(&element[nesting_key]) {
                    let nested = match nested {
                        Value::Object(map)
                            if !map.keys().any(|k| expands_to(&active_context, k, "@value")) =>
                        {
                            map
                        }
                        _ => {
                            return Err(error(
                                ErrorCode::InvalidNestValue,
                                format!("value of nesting key '{}' must be a node object", nesting_key),
                            ))
                        }
                    };

                    let nested_context = match nest_term
                        .as_ref()
                        .and_then(|t| t.local_context.as_ref().map(|local| (t, local)))
                    {
                        Some((term, local)) => {
                            let flags = ContextFlags {
                                override_protected: true,
                                ..ContextFlags::default()
                            };
                            let processed = self
                                .process_context_with(&active_context, local, term.base_url.as_ref(), vec![], flags)
                                .await?;
                            Arc::new(processed)
                        }
                        None => active_context.clone(),
                    };

                    let nested_scope = EntryScope {
                        active_property: Some(nesting_key),
                        ..scope
                    };
                    self.expand_entries(result, nested_context, nested, nested_scope)
                        .await?;
                }
            }

            Ok(())
        })
    }

    fn expand_language_map(
        &mut self,
        active_context: &Context,
        term: &Term,
        key: &str,
        language_map: &Map<String, Value>,
        ordered: bool,
    ) -> Result<Value> {
        // 13.7.2, 13.7.3
        let direction = term
            .direction_mapping
            .or(active_context.direction.as_ref())
            .copied();

        let mut entries: Vec<(&String, &Value)> = language_map.iter().collect();
        if ordered {
            entries.sort_by(|a, b| a.0.cmp(b.0));
        }

        let mut expanded = vec![];
        for (language, language_value) in entries {
            let is_none = expands_to(active_context, language, "@none");

            for item in as_values(language_value) {
                match item {
                    Value::Null => continue,
                    Value::String(_) => (),
                    _ => {
                        return Err(error(
                            ErrorCode::InvalidLanguageMapValue,
                            format!("language map of '{}' holds {} under {}", key, item, language),
                        ))
                    }
                }

                let mut v = Map::new();
                v.insert("@value".to_owned(), item.clone());

                if !is_none {
                    let tag = language.to_lowercase();
                    if !is_well_formed_language_tag(&tag) {
                        self.warn(
                            ErrorCode::MalformedLanguageTag,
                            format!("'{}' is not a well-formed language tag", language),
                        );
                    }
                    v.insert("@language".to_owned(), Value::String(tag));
                }

                if let Some(direction) = direction {
                    v.insert("@direction".to_owned(), direction.as_str().into());
                }

                expanded.push(Value::Object(v));
            }
        }

        Ok(Value::Array(expanded))
    }

    async fn expand_index_map(
        &mut self,
        active_context: &Arc<Context>,
        term: &Term,
        key: &str,
        index_map: &Map<String, Value>,
        base_url: Option<&Url>,
        flags: ExpandFlags,
    ) -> Result<Value> {
        let has = |container: Container| term.has_container(container);
        let index_key = term.index_mapping.as_deref().unwrap_or("@index");

        let mut entries: Vec<(&String, &Value)> = index_map.iter().collect();
        if flags.ordered {
            entries.sort_by(|a, b| a.0.cmp(b.0));
        }

        let mut expanded = vec![];
        for (index, index_value) in entries {
            // 13.8.3.1 - 13.8.3.3
            let map_context = if has(Container::Id) || has(Container::Type) {
                let mut map_context = active_context
                    .previous_context
                    .clone()
                    .unwrap_or_else(|| active_context.clone());

                if has(Container::Type) {
                    if let Some(index_term) = map_context.terms.get(index.as_str()).cloned() {
                        if let Some(local) = &index_term.local_context {
                            let processed = self
                                .process_context_with(
                                    &map_context,
                                    local,
                                    index_term.base_url.as_ref(),
                                    vec![],
                                    ContextFlags::default(),
                                )
                                .await?;
                            map_context = Arc::new(processed);
                        }
                    }
                }

                map_context
            } else {
                active_context.clone()
            };

            // 13.8.3.4
            let expanded_index = active_context.expand_iri(index, false, true);
            let is_none = expanded_index.as_deref() == Some("@none");

            // 13.8.3.6
            let map_flags = ExpandFlags {
                from_map: true,
                inside_list: false,
                ..flags
            };
            let items = self
                .expand_element(map_context, Some(key), index_value, base_url, map_flags)
                .await?;

            // 13.8.3.7
            for item in into_array(items) {
                let mut item = match item {
                    Value::Object(item) => item,
                    other => {
                        expanded.push(other);
                        continue;
                    }
                };

                if has(Container::Graph) && NodeKind::of_map(&item) != NodeKind::GraphObject {
                    let mut graph = Map::new();
                    graph.insert("@graph".to_owned(), json!([item]));
                    item = graph;
                }

                if has(Container::Index) && index_key != "@index" && !is_none {
                    // 13.8.3.7.2
                    let re_expanded = self.expand_value(active_context, index_key, &Value::String(index.clone()));
                    if let Some(expanded_index_key) = self.expand_iri(active_context, index_key, false, true, ErrorCode::InvalidIriMapping) {
                        let mut values = vec![re_expanded];
                        if let Some(existing) = item.remove(&expanded_index_key) {
                            values.extend(into_array(existing));
                        }
                        item.insert(expanded_index_key, Value::Array(values));
                    }

                    if item.contains_key("@value") && item.len() > 1 {
                        return Err(error(
                            ErrorCode::InvalidValueObject,
                            format!("value in property-valued index of '{}' cannot carry the index", key),
                        ));
                    }
                } else if has(Container::Index) && !item.contains_key("@index") && !is_none {
                    item.insert("@index".to_owned(), Value::String(index.clone()));
                } else if has(Container::Id) && !item.contains_key("@id") && !is_none {
                    let id = self.expand_iri(active_context, index, true, false, ErrorCode::InvalidIdValue);
                    item.insert("@id".to_owned(), id.map_or(Value::Null, Value::String));
                } else if has(Container::Type) && !is_none {
                    if let Some(expanded_index) = &expanded_index {
                        let mut types = vec![Value::String(expanded_index.clone())];
                        if let Some(existing) = item.remove("@type") {
                            types.extend(into_array(existing));
                        }
                        item.insert("@type".to_owned(), Value::Array(types));
                    }
                }

                expanded.push(Value::Object(item));
            }
        }

        Ok(Value::Array(expanded))
    }
}

/// Steps 15 to 19: validates the collected entries and drops what may not
/// stand on its own.
fn finish_object(
    mut result: Map<String, Value>,
    active_property: Option<&str>,
    frame_expansion: bool,
) -> Result<Value> {
    let name = property_name(active_property);

    let result = if result.contains_key("@value") {
        // 15
        if let Some(key) = result.keys().find(|k| !VALUE_OBJECT_KEYS.contains(k.as_str())) {
            return Err(error(
                ErrorCode::InvalidValueObject,
                format!("value object in {} has an unexpected {} entry", name, key),
            ));
        }

        let tagged = result.contains_key("@language") || result.contains_key("@direction");
        if tagged && result.contains_key("@type") {
            return Err(error(
                ErrorCode::InvalidValueObject,
                format!("value object in {} has both @type and a language or direction", name),
            ));
        }

        let value = &result["@value"];
        match result.get("@type") {
            Some(Value::String(t)) if t == "@json" => (),
            _ if value.is_null() || value.as_array().map_or(false, Vec::is_empty) => {
                return Ok(Value::Null)
            }
            _ if result.contains_key("@language") && !value.is_string() && !frame_expansion => {
                return Err(error(
                    ErrorCode::InvalidLanguageTaggedValue,
                    format!("language-tagged value in {} is not a string", name),
                ))
            }
            Some(t) if !frame_expansion && !t.as_str().map_or(false, is_absolute_iri) => {
                return Err(error(
                    ErrorCode::InvalidTypedValue,
                    format!("typed value in {} has type {}, which is not an IRI", name, t),
                ))
            }
            _ => (),
        }

        Value::Object(result)
    } else if let Some(types) = result.get_mut("@type") {
        // 16
        if !types.is_array() {
            let single = types.take();
            *types = Value::Array(vec![single]);
        }

        Value::Object(result)
    } else if result.contains_key("@set") || result.contains_key("@list") {
        // 17
        if result.keys().any(|k| !matches!(k.as_str(), "@set" | "@list" | "@index"))
            || (result.contains_key("@set") && result.contains_key("@list"))
        {
            return Err(error(
                ErrorCode::InvalidSetOrListObject,
                format!("set or list object in {} has entries besides @index", name),
            ));
        }

        match result.remove("@set") {
            Some(set) => set,
            None => Value::Object(result),
        }
    } else {
        Value::Object(result)
    };

    if let Value::Object(map) = &result {
        // 18
        if map.len() == 1 && map.contains_key("@language") {
            return Ok(Value::Null);
        }

        // 19
        if matches!(active_property, None | Some("@graph")) && !frame_expansion {
            let free_floating =
                map.is_empty() || map.contains_key("@value") || map.contains_key("@list");
            let lone_id = map.len() == 1 && map.contains_key("@id");
            if free_floating || lone_id {
                return Ok(Value::Null);
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{expand, expand_with_warnings, JsonLdOptions};
    use crate::loader::NoLoader;
    use async_std::task::block_on;

    fn expanded(input: Value) -> Value {
        block_on(expand(&input, &JsonLdOptions::default(), &NoLoader)).unwrap()
    }

    fn expand_error(input: Value) -> ErrorCode {
        block_on(expand(&input, &JsonLdOptions::default(), &NoLoader))
            .unwrap_err()
            .code
    }

    #[test]
    fn free_floating_values_are_dropped() {
        assert_eq!(expanded(json!({"@context": {}, "foo": "bar"})), json!([]));
        assert_eq!(expanded(json!("just a string")), json!([]));
        assert_eq!(expanded(json!({"@value": "free"})), json!([]));
        assert_eq!(expanded(json!({"@id": "http://example.org/lonely"})), json!([]));
        assert_eq!(
            expanded(json!({"@graph": [{"@value": 1}, {"@list": [1]}, {"@id": "http://example.org/a"}]})),
            json!([])
        );
    }

    #[test]
    fn value_objects_are_normalised() {
        let input = json!({
            "@context": {"ex": "http://example.org/"},
            "ex:name": {"@value": "Alice", "@language": "EN"}
        });

        assert_eq!(
            expanded(input),
            json!([{"http://example.org/name": [{"@value": "Alice", "@language": "en"}]}])
        );
    }

    #[test]
    fn type_coercion() {
        let input = json!({
            "@context": {
                "@vocab": "http://example.org/",
                "@base": "http://example.org/base/",
                "age": {"@type": "http://www.w3.org/2001/XMLSchema#integer"},
                "knows": {"@type": "@id"},
                "kind": {"@type": "@vocab"},
                "Person": "http://schema.org/Person"
            },
            "age": "42",
            "knows": "bob",
            "kind": "Person"
        });

        assert_eq!(
            expanded(input),
            json!([{
                "http://example.org/age": [{"@value": "42", "@type": "http://www.w3.org/2001/XMLSchema#integer"}],
                "http://example.org/knows": [{"@id": "http://example.org/base/bob"}],
                "http://example.org/kind": [{"@id": "http://schema.org/Person"}]
            }])
        );
    }

    #[test]
    fn language_and_direction_defaults() {
        let input = json!({
            "@context": {
                "@vocab": "http://example.org/",
                "@language": "de",
                "@direction": "ltr",
                "plain": {"@language": null},
                "arabic": {"@language": "ar", "@direction": "rtl"}
            },
            "name": "Name",
            "plain": "plain",
            "arabic": "نص",
            "count": 3
        });

        assert_eq!(
            expanded(input),
            json!([{
                "http://example.org/name": [{"@value": "Name", "@language": "de", "@direction": "ltr"}],
                "http://example.org/plain": [{"@value": "plain", "@direction": "ltr"}],
                "http://example.org/arabic": [{"@value": "نص", "@language": "ar", "@direction": "rtl"}],
                "http://example.org/count": [{"@value": 3}]
            }])
        );
    }

    #[test]
    fn language_maps() {
        let input = json!({
            "@context": {
                "label": {"@id": "http://example.org/label", "@container": "@language"},
                "none": "@none"
            },
            "label": {"en": "Hello", "FR": ["Bonjour", null], "none": "Hallo"}
        });

        let options = JsonLdOptions {
            ordered: true,
            ..JsonLdOptions::default()
        };
        let result = block_on(expand(&input, &options, &NoLoader)).unwrap();
        assert_eq!(
            result,
            json!([{"http://example.org/label": [
                {"@value": "Bonjour", "@language": "fr"},
                {"@value": "Hello", "@language": "en"},
                {"@value": "Hallo"}
            ]}])
        );

        let err = expand_error(json!({
            "@context": {"label": {"@id": "http://example.org/label", "@container": "@language"}},
            "label": {"en": {"@value": "x"}}
        }));
        assert_eq!(err, ErrorCode::InvalidLanguageMapValue);
    }

    #[test]
    fn index_id_and_type_maps() {
        let input = json!({
            "@context": {
                "@vocab": "http://example.org/",
                "byIndex": {"@container": "@index"},
                "byId": {"@container": "@id"},
                "byType": {"@container": "@type"}
            },
            "byIndex": {"first": {"name": "A"}, "@none": {"name": "B"}},
            "byId": {"http://example.org/c": {"name": "C"}},
            "byType": {"Thing": {"name": "D"}}
        });

        assert_eq!(
            expanded(input),
            json!([{
                "http://example.org/byIndex": [
                    {"@index": "first", "http://example.org/name": [{"@value": "A"}]},
                    {"http://example.org/name": [{"@value": "B"}]}
                ],
                "http://example.org/byId": [
                    {"@id": "http://example.org/c", "http://example.org/name": [{"@value": "C"}]}
                ],
                "http://example.org/byType": [
                    {"@type": ["http://example.org/Thing"], "http://example.org/name": [{"@value": "D"}]}
                ]
            }])
        );
    }

    #[test]
    fn language_maps_carry_direction() {
        let input = json!({
            "@context": {
                "@direction": "rtl",
                "label": {"@id": "http://example.org/label", "@container": "@language"},
                "title": {"@id": "http://example.org/title", "@container": "@language", "@direction": "ltr"},
                "plain": {"@id": "http://example.org/plain", "@container": "@language", "@direction": null}
            },
            "label": {"ar": "x"},
            "title": {"en": "y"},
            "plain": {"en": "z"}
        });

        assert_eq!(
            expanded(input),
            json!([{
                "http://example.org/label": [{"@value": "x", "@language": "ar", "@direction": "rtl"}],
                "http://example.org/title": [{"@value": "y", "@language": "en", "@direction": "ltr"}],
                "http://example.org/plain": [{"@value": "z", "@language": "en"}]
            }])
        );
    }

    #[test]
    fn type_maps_use_the_previous_context() {
        let input = json!({
            "@context": {
                "@vocab": "http://example.org/",
                "Person": {"@context": {"name": "http://schema.org/name"}},
                "Outer": {"@context": {
                    "byType": {"@container": "@type"},
                    "nick": "http://other.org/nick"
                }}
            },
            "@id": "http://example.org/x",
            "@type": "Outer",
            "nick": "outer",
            "byType": {"Person": {"nick": "inner", "name": "A"}}
        });

        assert_eq!(
            expanded(input),
            json!([{
                "@id": "http://example.org/x",
                "@type": ["http://example.org/Outer"],
                "http://other.org/nick": [{"@value": "outer"}],
                "http://example.org/byType": [{
                    "@type": ["http://example.org/Person"],
                    "http://example.org/nick": [{"@value": "inner"}],
                    "http://schema.org/name": [{"@value": "A"}]
                }]
            }])
        );
    }

    #[test]
    fn graph_id_and_graph_index_maps() {
        let input = json!({
            "@context": {
                "@vocab": "http://example.org/",
                "graphs": {"@container": ["@graph", "@id"]},
                "indexed": {"@container": ["@graph", "@index"]}
            },
            "graphs": {
                "http://example.org/g1": {"name": "A"},
                "@none": {"name": "B"}
            },
            "indexed": {"first": {"name": "C"}}
        });

        assert_eq!(
            expanded(input),
            json!([{
                "http://example.org/graphs": [
                    {
                        "@id": "http://example.org/g1",
                        "@graph": [{"http://example.org/name": [{"@value": "A"}]}]
                    },
                    {"@graph": [{"http://example.org/name": [{"@value": "B"}]}]}
                ],
                "http://example.org/indexed": [{
                    "@index": "first",
                    "@graph": [{"http://example.org/name": [{"@value": "C"}]}]
                }]
            }])
        );
    }

    #[test]
    fn property_valued_index() {
        let input = json!({
            "@context": {
                "@vocab": "http://example.org/",
                "author": {"@container": "@index", "@index": "role"}
            },
            "author": {"editor": {"@id": "http://example.org/alice"}}
        });

        assert_eq!(
            expanded(input),
            json!([{
                "http://example.org/author": [{
                    "@id": "http://example.org/alice",
                    "http://example.org/role": [{"@value": "editor"}]
                }]
            }])
        );

        let err = expand_error(json!({
            "@context": {
                "@vocab": "http://example.org/",
                "author": {"@container": "@index", "@index": "role"}
            },
            "author": {"editor": "just a string"}
        }));
        assert_eq!(err, ErrorCode::InvalidValueObject);
    }

    #[test]
    fn lists_and_sets() {
        let input = json!({
            "@context": {
                "@vocab": "http://example.org/",
                "items": {"@container": "@list"}
            },
            "items": ["a", ["b"]],
            "set": {"@set": ["c"]},
            "nested": {"@list": [[]]}
        });

        assert_eq!(
            expanded(input),
            json!([{
                "http://example.org/items": [{"@list": [
                    {"@value": "a"},
                    {"@list": [{"@value": "b"}]}
                ]}],
                "http://example.org/set": [{"@value": "c"}],
                "http://example.org/nested": [{"@list": [{"@list": []}]}]
            }])
        );

        let err = expand_error(json!({"http://example.org/p": {"@list": [], "@id": "x"}}));
        assert_eq!(err, ErrorCode::InvalidSetOrListObject);
    }

    #[test]
    fn list_of_lists_in_json_ld_10() {
        let options = JsonLdOptions {
            processing_mode: ProcessingMode::JsonLd10,
            ..JsonLdOptions::default()
        };
        let input = json!({"http://example.org/p": {"@list": [["a"]]}});

        let err = block_on(expand(&input, &options, &NoLoader)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ListOfLists);
    }

    #[test]
    fn graph_containers() {
        let input = json!({
            "@context": {
                "@vocab": "http://example.org/",
                "claim": {"@container": "@graph"}
            },
            "claim": {"name": "A"}
        });

        assert_eq!(
            expanded(input),
            json!([{
                "http://example.org/claim": [{"@graph": [{"http://example.org/name": [{"@value": "A"}]}]}]
            }])
        );
    }

    #[test]
    fn reverse_properties() {
        let input = json!({
            "@context": {
                "@vocab": "http://example.org/",
                "children": {"@reverse": "parent"}
            },
            "@id": "http://example.org/homer",
            "children": {"@id": "http://example.org/bart"},
            "@reverse": {"friend": {"@id": "http://example.org/moe"}}
        });

        assert_eq!(
            expanded(input),
            json!([{
                "@id": "http://example.org/homer",
                "@reverse": {
                    "http://example.org/parent": [{"@id": "http://example.org/bart"}],
                    "http://example.org/friend": [{"@id": "http://example.org/moe"}]
                }
            }])
        );

        let err = expand_error(json!({
            "@context": {"children": {"@reverse": "http://example.org/parent"}},
            "children": "literal"
        }));
        assert_eq!(err, ErrorCode::InvalidReversePropertyValue);

        let err = expand_error(json!({"@reverse": "nope"}));
        assert_eq!(err, ErrorCode::InvalidReverseValue);
    }

    #[test]
    fn double_reversal() {
        let input = json!({
            "@context": {"isPOf": {"@reverse": "http://example.org/p"}},
            "@id": "http://example.org/a",
            "@reverse": {"isPOf": {"@id": "http://example.org/b"}}
        });

        assert_eq!(
            expanded(input),
            json!([{
                "@id": "http://example.org/a",
                "http://example.org/p": [{"@id": "http://example.org/b"}]
            }])
        );
    }

    #[test]
    fn nesting() {
        let input = json!({
            "@context": {
                "@vocab": "http://example.org/",
                "details": "@nest",
                "label": {"@nest": "details"}
            },
            "@id": "http://example.org/x",
            "details": {"label": "X", "size": 3}
        });

        assert_eq!(
            expanded(input),
            json!([{
                "@id": "http://example.org/x",
                "http://example.org/label": [{"@value": "X"}],
                "http://example.org/size": [{"@value": 3}]
            }])
        );

        let err = expand_error(json!({
            "@context": {"details": "@nest"},
            "details": "not an object"
        }));
        assert_eq!(err, ErrorCode::InvalidNestValue);
    }

    #[test]
    fn json_literals() {
        let input = json!({
            "@context": {"data": {"@id": "http://example.org/data", "@type": "@json"}},
            "data": {"b": [1, 2], "a": null}
        });

        assert_eq!(
            expanded(input),
            json!([{"http://example.org/data": [{"@value": {"b": [1, 2], "a": null}, "@type": "@json"}]}])
        );
    }

    #[test]
    fn included_blocks() {
        let input = json!({
            "@context": {"@vocab": "http://example.org/"},
            "@id": "http://example.org/a",
            "@included": [{"@id": "http://example.org/b", "name": "B"}]
        });

        assert_eq!(
            expanded(input),
            json!([{
                "@id": "http://example.org/a",
                "@included": [{"@id": "http://example.org/b", "http://example.org/name": [{"@value": "B"}]}]
            }])
        );

        let err = expand_error(json!({
            "http://example.org/p": {"@included": {"@value": "x"}}
        }));
        assert_eq!(err, ErrorCode::InvalidIncludedValue);
    }

    #[test]
    fn type_scoped_contexts_do_not_propagate() {
        let input = json!({
            "@context": {
                "@vocab": "http://example.org/",
                "Person": {"@context": {"name": "http://schema.org/name"}}
            },
            "@type": "Person",
            "name": "Outer",
            "child": {"name": "Inner"}
        });

        assert_eq!(
            expanded(input),
            json!([{
                "@type": ["http://example.org/Person"],
                "http://schema.org/name": [{"@value": "Outer"}],
                "http://example.org/child": [{"http://example.org/name": [{"@value": "Inner"}]}]
            }])
        );
    }

    #[test]
    fn property_scoped_contexts() {
        let input = json!({
            "@context": {
                "@vocab": "http://example.org/",
                "author": {"@context": {"name": "http://schema.org/name"}}
            },
            "name": "Book",
            "author": {"name": "Writer"}
        });

        assert_eq!(
            expanded(input),
            json!([{
                "http://example.org/name": [{"@value": "Book"}],
                "http://example.org/author": [{"http://schema.org/name": [{"@value": "Writer"}]}]
            }])
        );
    }

    #[test]
    fn keyword_errors() {
        assert_eq!(
            expand_error(json!({"@id": "http://example.org/a", "id": "http://example.org/b", "@context": {"id": "@id"}})),
            ErrorCode::CollidingKeywords
        );
        assert_eq!(expand_error(json!({"@id": 5})), ErrorCode::InvalidIdValue);
        assert_eq!(expand_error(json!({"@type": 5})), ErrorCode::InvalidTypeValue);
        assert_eq!(
            expand_error(json!({"http://example.org/p": {"@value": "x", "@index": 5}})),
            ErrorCode::InvalidIndexValue
        );
        assert_eq!(
            expand_error(json!({"http://example.org/p": {"@value": {"a": 1}}})),
            ErrorCode::InvalidValueObjectValue
        );
        assert_eq!(
            expand_error(json!({"http://example.org/p": {"@value": "x", "@language": 5}})),
            ErrorCode::InvalidLanguageTaggedString
        );
        assert_eq!(
            expand_error(json!({"http://example.org/p": {"@value": 5, "@language": "en"}})),
            ErrorCode::InvalidLanguageTaggedValue
        );
        assert_eq!(
            expand_error(json!({"http://example.org/p": {"@value": "x", "@type": "relative"}})),
            ErrorCode::InvalidTypedValue
        );
        assert_eq!(
            expand_error(json!({"http://example.org/p": {"@value": "x", "@type": "http://example.org/t", "@language": "en"}})),
            ErrorCode::InvalidValueObject
        );
        assert_eq!(
            expand_error(json!({"http://example.org/p": {"@value": "x", "@direction": "up"}})),
            ErrorCode::InvalidBaseDirection
        );
        assert_eq!(
            expand_error(json!({"@reverse": {"@id": "http://example.org/a"}})),
            ErrorCode::InvalidReversePropertyMap
        );
    }

    #[test]
    fn null_values_drop_entries() {
        let input = json!({
            "http://example.org/a": null,
            "http://example.org/b": {"@value": null},
            "http://example.org/c": "kept"
        });

        assert_eq!(
            expanded(input),
            json!([{"http://example.org/c": [{"@value": "kept"}]}])
        );
    }

    #[test]
    fn safe_mode_reports_dropped_keys() {
        let options = JsonLdOptions {
            safe_mode: true,
            ..JsonLdOptions::default()
        };
        let input = json!({"@id": "http://example.org/a", "unmapped": "x", "http://example.org/p": "y"});

        let (result, warnings) = block_on(expand_with_warnings(&input, &options, &NoLoader)).unwrap();
        assert_eq!(
            result,
            json!([{"@id": "http://example.org/a", "http://example.org/p": [{"@value": "y"}]}])
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, ErrorCode::InvalidIriMapping);
    }

    #[test]
    fn keyword_like_values_warn_by_kind() {
        let input = json!({
            "@id": "@thing",
            "@type": "@kind",
            "http://example.org/p": "x"
        });

        let (_, warnings) =
            block_on(expand_with_warnings(&input, &JsonLdOptions::default(), &NoLoader)).unwrap();
        let codes: Vec<ErrorCode> = warnings.iter().map(|w| w.code).collect();
        assert!(codes.contains(&ErrorCode::InvalidIdValue));
        assert!(codes.contains(&ErrorCode::InvalidTypeValue));
        assert!(!codes.contains(&ErrorCode::InvalidTermDefinition));
    }

    #[test]
    fn frame_expansion_keeps_wildcards() {
        let options = JsonLdOptions {
            frame_expansion: true,
            ..JsonLdOptions::default()
        };
        let frame = json!({
            "@context": {"@vocab": "http://example.org/"},
            "@type": {},
            "@explicit": true,
            "name": {}
        });

        let result = block_on(expand(&frame, &options, &NoLoader)).unwrap();
        assert_eq!(
            result,
            json!([{
                "@type": [{}],
                "@explicit": {"@value": true},
                "http://example.org/name": [{}]
            }])
        );
    }
}
