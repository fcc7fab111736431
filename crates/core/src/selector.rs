//! Chooses the next item to serve by scoring candidates on Fisher
//! information modulated by rule-derived boosts.

use cat_domain::{AbilityVector, SelectionContext};
use rand::Rng;
use std::collections::HashSet;
use uuid::Uuid;

use crate::irt::{fisher_info, IrtParams};
use crate::ports::{CandidateItem, CandidateQuery, CatalogueView};

const TIE_EPSILON: f64 = 1e-9;

pub struct SelectorInput<'a> {
    pub subject_id: Uuid,
    pub used_ids: &'a [Uuid],
    pub ctx: &'a SelectionContext,
    pub position: Option<u32>,
    pub topic_filter: &'a [Uuid],
    pub ability: &'a AbilityVector,
}

/// Picks the next item to serve, or `None` if no candidate exists even
/// after the no-IRT fallback.
pub async fn select_next<R: Rng>(
    catalogue: &dyn CatalogueView,
    input: SelectorInput<'_>,
    rng: &mut R,
) -> anyhow::Result<Option<CandidateItem>> {
    let band = active_band(input.ctx, input.position);

    let query = CandidateQuery {
        subject_id: input.subject_id,
        exclude_ids: used_ids_with_blocks(input.used_ids, &input.ctx.block_item_ids),
        b_min: band.and_then(|b| b.b_min),
        b_max: band.and_then(|b| b.b_max),
        topic_filter: input.topic_filter.to_vec(),
    };

    let candidates = catalogue.candidate_items(&query).await?;
    if let Some(item) = score_and_pick(&candidates, input.ability, input.ctx, rng) {
        return Ok(Some(item));
    }

    // Fallback (a): ignore IRT entirely, keep other constraints.
    if let Some(item) = catalogue.random_candidate(&query).await? {
        return Ok(Some(item));
    }

    // Fallback (b): nothing eligible at all.
    Ok(None)
}

fn active_band(ctx: &SelectionContext, position: Option<u32>) -> Option<cat_domain::DifficultyRange> {
    let band = ctx.difficulty_range?;
    let active = match band.lte_position {
        None => true,
        Some(lte) => position.map(|p| p <= lte).unwrap_or(true),
    };
    active.then_some(band)
}

fn used_ids_with_blocks(used_ids: &[Uuid], blocked: &HashSet<Uuid>) -> Vec<Uuid> {
    let mut all: Vec<Uuid> = used_ids.to_vec();
    all.extend(blocked.iter().copied());
    all
}

fn score_and_pick<R: Rng>(
    candidates: &[CandidateItem],
    ability: &AbilityVector,
    ctx: &SelectionContext,
    rng: &mut R,
) -> Option<CandidateItem> {
    let mut scored: Vec<(f64, &CandidateItem)> = Vec::new();

    for candidate in candidates {
        if !candidate.irt.is_fully_calibrated() {
            continue;
        }
        let params = IrtParams {
            a: candidate.irt.a,
            b: candidate.irt.b,
            c: candidate.irt.c,
        };
        let theta_item = item_theta(candidate, ability);
        let info = fisher_info(theta_item, params);
        if info <= 0.0 {
            continue;
        }
        let boost = candidate
            .topic_ids
            .iter()
            .map(|t| ctx.topic_boost.get(t).copied().unwrap_or(1.0))
            .product::<f64>();
        scored.push((info * boost, candidate));
    }

    if scored.is_empty() {
        return None;
    }

    let max_score = scored.iter().fold(f64::MIN, |acc, (s, _)| acc.max(*s));
    let tied: Vec<&CandidateItem> = scored
        .iter()
        .filter(|(s, _)| (s - max_score).abs() <= TIE_EPSILON)
        .map(|(_, c)| *c)
        .collect();

    let idx = rng.gen_range(0..tied.len());
    Some(tied[idx].clone())
}

fn item_theta(candidate: &CandidateItem, ability: &AbilityVector) -> f64 {
    if candidate.topic_ids.is_empty() {
        return ability.avg_theta;
    }
    let thetas: Vec<f64> = candidate
        .topic_ids
        .iter()
        .filter_map(|t| ability.theta_by_topic.get(t).copied())
        .collect();
    if thetas.is_empty() {
        ability.avg_theta
    } else {
        thetas.iter().sum::<f64>() / thetas.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cat_domain::{DifficultyRange, Item, ItemIrt};

    fn candidate(b: f64, topics: Vec<Uuid>) -> CandidateItem {
        CandidateItem {
            item: Item {
                id: Uuid::new_v4(),
                subject_id: Uuid::nil(),
                stem: "stem".into(),
                difficulty_tag: None,
                avg_time_ms: None,
                options: vec![],
            },
            irt: ItemIrt {
                a: Some(1.0),
                b: Some(b),
                c: Some(0.2),
            },
            topic_ids: topics,
        }
    }

    #[test]
    fn picks_highest_information_candidate() {
        let ability = AbilityVector::default();
        let ctx = SelectionContext::default();
        let a = candidate(0.0, vec![]);
        let b = candidate(2.0, vec![]);
        let candidates = vec![a.clone(), b.clone()];
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        let chosen = score_and_pick(&candidates, &ability, &ctx, &mut rng).unwrap();
        assert_eq!(chosen.item.id, a.item.id);
    }

    #[test]
    fn band_inactive_past_lte_position() {
        let ctx = SelectionContext {
            difficulty_range: Some(DifficultyRange {
                b_min: Some(-1.0),
                b_max: Some(0.5),
                lte_position: Some(2),
            }),
            ..Default::default()
        };
        assert!(active_band(&ctx, Some(2)).is_some());
        assert!(active_band(&ctx, Some(3)).is_none());
    }

    #[test]
    fn skips_candidates_missing_irt_params() {
        let ability = AbilityVector::default();
        let ctx = SelectionContext::default();
        let incomplete = CandidateItem {
            irt: ItemIrt::default(),
            ..candidate(0.0, vec![])
        };
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        assert!(score_and_pick(&[incomplete], &ability, &ctx, &mut rng).is_none());
    }
}
