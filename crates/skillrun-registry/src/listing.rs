//! In-memory filtering, sorting and paging for `list`

use crate::models::{ListQuery, PagedResult, SkillSummary, SortOrder};

/// Apply a list query to a set of summaries
///
/// Skills are ordered by name. Keys in `sort_by` are accepted for every
/// [`SortKey`](crate::SortKey) but each one falls back to the name ordering.
pub fn apply_query(mut skills: Vec<SkillSummary>, query: &ListQuery) -> PagedResult<SkillSummary> {
    let needle = query
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_lowercase);

    skills.retain(|skill| {
        needle
            .as_deref()
            .map_or(true, |needle| skill.name.to_lowercase().contains(needle))
            && query.tags.iter().all(|tag| skill.tags.contains(tag))
    });

    skills.sort_by(|a, b| {
        let ordering = a.name.cmp(&b.name);
        match query.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    let limit = query.limit.max(1);
    let page = query.page.max(1);
    let total = skills.len();
    let total_pages = total.div_ceil(limit);
    let items = skills
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();

    PagedResult {
        items,
        total,
        page,
        limit,
        total_pages,
    }
}
