//! The eight organization strategies. Each one maps a species row to grain trigger
//! decisions; all share the direct parameter mapping and the duration/clustering
//! helpers from the parent module.

use rand::{rngs::SmallRng, Rng};

use crate::{cluster::single_linkage, particle::RegionParticle};

use super::{
    duration_from_speed, priority_score, GrainDescriptor, OrganizeContext, OrganizerParams,
    MAX_GRAIN_DURATION, MIN_GRAIN_DURATION,
};

// -------------------------------------------------------------------------------------------------

/// The direct particle→grain parameter mapping, shared as the starting point by most
/// modes: x → sample offset and pan, y → pitch (±12 semitones), speed → gain, trail
/// length → duration.
fn base_descriptor(
    member: &RegionParticle,
    context: &OrganizeContext,
    rng: &mut SmallRng,
) -> GrainDescriptor {
    let particle = &member.particle;
    let (field_width, field_height) = context.field;

    let x_norm = (particle.x / field_width).clamp(0.0, 1.0);
    let y_norm = (particle.y / field_height).clamp(0.0, 1.0);
    let speed_norm = (particle.speed() / 10.0).min(1.0);
    let trail_norm = (particle.trail_length / 100.0).clamp(0.0, 1.0);

    GrainDescriptor {
        trigger: true,
        delay: 0.0,
        position: x_norm,
        pitch: (0.5 - y_norm) * 24.0,
        detune: 0.0,
        pan: x_norm * 2.0 - 1.0,
        gain: 0.2 + 0.8 * speed_norm,
        duration: crate::utils::lerp(MIN_GRAIN_DURATION, MAX_GRAIN_DURATION, trail_norm),
        rate_multiplier: 1.0,
        priority: priority_score(member, context.statistics, rng),
    }
}

// -------------------------------------------------------------------------------------------------

/// Direct: always trigger, one grain per particle.
pub(super) fn direct(
    context: &OrganizeContext,
    rng: &mut SmallRng,
    out: &mut Vec<GrainDescriptor>,
) {
    for member in context.members {
        out.push(base_descriptor(member, context, rng));
    }
}

// -------------------------------------------------------------------------------------------------

/// Clustered amplitude: particles within the distance threshold merge into one event
/// whose gain, duration and voice count grow with cluster size. Clusters below the
/// minimum size fall back to the direct per-particle mapping.
pub(super) fn clustered_amplitude(
    context: &OrganizeContext,
    params: &OrganizerParams,
    rng: &mut SmallRng,
    out: &mut Vec<GrainDescriptor>,
) {
    let positions: Vec<(f32, f32)> = context
        .members
        .iter()
        .map(|m| (m.particle.x, m.particle.y))
        .collect();
    let clusters = single_linkage(&positions, params.cluster_distance);

    for members in &clusters {
        if members.len() < params.min_cluster_size {
            for &index in members {
                out.push(base_descriptor(&context.members[index], context, rng));
            }
            continue;
        }

        let (centroid_x, centroid_y) = crate::cluster::centroid(&positions, members);
        let mean_speed = members
            .iter()
            .map(|&i| context.members[i].particle.speed())
            .sum::<f32>()
            / members.len() as f32;
        let size_norm = (members.len() as f32 / 20.0).min(1.0);

        let (field_width, _) = context.field;
        let x_norm = (centroid_x / field_width).clamp(0.0, 1.0);
        let gain = (0.3 + 0.7 * size_norm).min(1.0);
        let duration =
            (duration_from_speed(mean_speed) * (1.0 + size_norm)).min(2.0 * MAX_GRAIN_DURATION);
        let voices = (members.len() / params.min_cluster_size)
            .clamp(1, params.max_cluster_voices);

        // the loudest cluster member decides the ranking for all of its voices
        let priority = members
            .iter()
            .map(|&i| priority_score(&context.members[i], context.statistics, rng))
            .fold(0.0f32, f32::max);

        for voice in 0..voices {
            let pan_offset = if voices > 1 {
                (voice as f32 / (voices - 1) as f32 - 0.5) * 0.4
            } else {
                0.0
            };
            out.push(GrainDescriptor {
                trigger: true,
                delay: voice as f32 * 0.005,
                position: x_norm,
                pitch: (0.5 - centroid_y / context.field.1).clamp(-0.5, 0.5) * 24.0,
                detune: 0.0,
                pan: (x_norm * 2.0 - 1.0 + pan_offset).clamp(-1.0, 1.0),
                gain,
                duration,
                rate_multiplier: 1.0,
                priority,
            });
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Density modulation: always trigger; denser neighborhoods play shorter grains at a
/// higher trigger rate with more overlap.
pub(super) fn density_modulation(
    context: &OrganizeContext,
    params: &OrganizerParams,
    rng: &mut SmallRng,
    out: &mut Vec<GrainDescriptor>,
) {
    // count row members per density cell; the sampler already bounded the row, so a
    // linear pass per member stays cheap
    let cell = params.density_cell_size;
    let cell_of = |m: &RegionParticle| {
        (
            (m.particle.x / cell).floor() as i32,
            (m.particle.y / cell).floor() as i32,
        )
    };

    for member in context.members {
        let own_cell = cell_of(member);
        let local_density = context
            .members
            .iter()
            .filter(|other| cell_of(other) == own_cell)
            .count();
        let density_norm = ((local_density - 1) as f32 / 10.0).min(1.0);

        let mut descriptor = base_descriptor(member, context, rng);
        // inverse duration: crowded cells turn into short, rapid grains
        descriptor.duration = (descriptor.duration / (1.0 + 3.0 * density_norm))
            .max(MIN_GRAIN_DURATION);
        descriptor.duration *= 1.0 + params.density_overlap * density_norm;
        descriptor.rate_multiplier = 1.0 + 2.0 * density_norm;
        out.push(descriptor);
    }
}

// -------------------------------------------------------------------------------------------------

/// Swarm intelligence: a boid-style alignment + cohesion + separation score gates the
/// trigger and bends pitch and duration; global chaos adds detune.
pub(super) fn swarm_intelligence(
    context: &OrganizeContext,
    params: &OrganizerParams,
    rng: &mut SmallRng,
    out: &mut Vec<GrainDescriptor>,
) {
    let radius_squared = params.swarm_neighbor_radius * params.swarm_neighbor_radius;

    for member in context.members {
        let particle = &member.particle;

        let mut neighbor_count = 0usize;
        let mut mean_vx = 0.0;
        let mut mean_vy = 0.0;
        let mut mean_x = 0.0;
        let mut mean_y = 0.0;
        let mut nearest_squared = f32::INFINITY;
        for other in context.members {
            if std::ptr::eq(other, member) {
                continue;
            }
            let distance_squared = particle.distance_squared(other.particle.x, other.particle.y);
            if distance_squared > radius_squared {
                continue;
            }
            neighbor_count += 1;
            mean_vx += other.particle.vx;
            mean_vy += other.particle.vy;
            mean_x += other.particle.x;
            mean_y += other.particle.y;
            nearest_squared = nearest_squared.min(distance_squared);
        }

        let score = if neighbor_count == 0 {
            0.0
        } else {
            let inv = 1.0 / neighbor_count as f32;
            mean_vx *= inv;
            mean_vy *= inv;
            mean_x *= inv;
            mean_y *= inv;

            // alignment: velocity agreement with the local mean heading
            let own_speed = particle.speed();
            let mean_speed = (mean_vx * mean_vx + mean_vy * mean_vy).sqrt();
            let alignment = if own_speed > f32::EPSILON && mean_speed > f32::EPSILON {
                ((particle.vx * mean_vx + particle.vy * mean_vy) / (own_speed * mean_speed) + 1.0)
                    * 0.5
            } else {
                0.0
            };
            // cohesion: proximity to the local centroid
            let cohesion = 1.0
                - (particle.distance_squared(mean_x, mean_y).sqrt()
                    / params.swarm_neighbor_radius)
                    .min(1.0);
            // separation: healthy personal space scores high, crowding scores low
            let separation =
                (nearest_squared.sqrt() / params.swarm_neighbor_radius).clamp(0.0, 1.0);

            params.swarm_alignment_weight * alignment
                + params.swarm_cohesion_weight * cohesion
                + params.swarm_separation_weight * separation
        };

        let mut descriptor = base_descriptor(member, context, rng);
        descriptor.trigger = score > params.swarm_trigger_threshold;
        descriptor.pitch += (score - 0.5) * 12.0;
        descriptor.duration =
            (descriptor.duration * (0.5 + score)).clamp(MIN_GRAIN_DURATION, MAX_GRAIN_DURATION);
        descriptor.detune = context.statistics.chaos * 25.0 * (rng.random::<f32>() * 2.0 - 1.0);
        out.push(descriptor);
    }
}

// -------------------------------------------------------------------------------------------------

/// Harmonic layers: the particle's vertical band selects a harmonic ratio; only bands
/// whose ratio is flagged active trigger. Pitch follows the ratio on a log2 scale,
/// gain falls off with the inverse ratio.
pub(super) fn harmonic_layers(
    context: &OrganizeContext,
    params: &OrganizerParams,
    rng: &mut SmallRng,
    out: &mut Vec<GrainDescriptor>,
) {
    let band_count = params.harmonic_ratios.len();
    let (_, field_height) = context.field;

    // params may arrive unsanitized; an empty ratio list degrades to unison
    if band_count == 0 {
        for member in context.members {
            let mut descriptor = base_descriptor(member, context, rng);
            descriptor.pitch = 0.0;
            out.push(descriptor);
        }
        return;
    }

    for member in context.members {
        let y_norm = (member.particle.y / field_height).clamp(0.0, 1.0);
        let band = ((y_norm * band_count as f32) as usize).min(band_count - 1);
        let ratio = params.harmonic_ratios[band];
        let active = params.harmonic_active.get(band).copied().unwrap_or(true);

        let mut descriptor = base_descriptor(member, context, rng);
        descriptor.trigger = active;
        descriptor.pitch = 12.0 * ratio.log2();
        descriptor.gain = (descriptor.gain / ratio).min(1.0);
        out.push(descriptor);
    }
}

// -------------------------------------------------------------------------------------------------

/// Rhythmic patterns: probabilistic triggers (P = speed / 10) gated to a BPM-derived
/// grid; grid positions on the accent list get a gain and duration boost.
pub(super) fn rhythmic_patterns(
    context: &OrganizeContext,
    params: &OrganizerParams,
    rng: &mut SmallRng,
    out: &mut Vec<GrainDescriptor>,
) {
    let step_duration = 60.0 / (params.rhythm_bpm as f64 * params.rhythm_subdivision as f64);
    let step_phase = (context.now / step_duration).fract();
    let on_grid = step_phase < params.rhythm_gate_width as f64;
    // steps count through one 4-beat bar before wrapping
    let steps_per_bar = 4 * params.rhythm_subdivision;
    let step_index = (context.now / step_duration) as u64 % steps_per_bar as u64;
    let accented = params.rhythm_accents.contains(&(step_index as u32));

    for member in context.members {
        let trigger_probability = (member.particle.speed() / 10.0).min(1.0);
        let mut descriptor = base_descriptor(member, context, rng);
        descriptor.trigger = on_grid && rng.random::<f32>() < trigger_probability;
        if accented {
            descriptor.gain = (descriptor.gain * 1.5).min(1.0);
            descriptor.duration = (descriptor.duration * 1.3).min(MAX_GRAIN_DURATION);
        }
        out.push(descriptor);
    }
}

// -------------------------------------------------------------------------------------------------

/// Spatial zones: the region's angular zone index shifts pitch stepwise and spreads
/// the trigger rate across zones.
pub(super) fn spatial_zones(
    context: &OrganizeContext,
    params: &OrganizerParams,
    rng: &mut SmallRng,
    out: &mut Vec<GrainDescriptor>,
) {
    let zone_count = context
        .members
        .iter()
        .map(|m| m.zone + 1)
        .max()
        .unwrap_or(1);

    for member in context.members {
        let zone_norm = member.zone as f32 / zone_count.max(2).saturating_sub(1) as f32;
        let mut descriptor = base_descriptor(member, context, rng);
        descriptor.pitch += (member.zone as f32 - zone_count as f32 * 0.5) * params.zone_pitch_step;
        descriptor.rate_multiplier =
            1.0 - params.zone_rate_spread * 0.5 + params.zone_rate_spread * zone_norm;
        out.push(descriptor);
    }
}

// -------------------------------------------------------------------------------------------------

/// Chaos modulation: triggers only once the population is chaotic (or a particle is
/// fast), then smears timing, pitch, pan and tuning proportionally to the chaos index
/// through the configured response curve.
pub(super) fn chaos_modulation(
    context: &OrganizeContext,
    params: &OrganizerParams,
    rng: &mut SmallRng,
    out: &mut Vec<GrainDescriptor>,
) {
    let chaos = context.statistics.chaos;
    let response = params.chaos_curve.apply(chaos);

    for member in context.members {
        let mut descriptor = base_descriptor(member, context, rng);
        descriptor.trigger =
            chaos > params.chaos_threshold || member.particle.speed() > params.chaos_speed_gate;
        descriptor.delay = response * params.chaos_delay_jitter * rng.random::<f32>();
        descriptor.pitch += response * params.chaos_pitch_jitter * (rng.random::<f32>() * 2.0 - 1.0);
        descriptor.pan = (descriptor.pan
            + response * params.chaos_pan_jitter * (rng.random::<f32>() * 2.0 - 1.0))
            .clamp(-1.0, 1.0);
        descriptor.detune = response * params.chaos_detune_cents * (rng.random::<f32>() * 2.0 - 1.0);
        out.push(descriptor);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::super::tests::{member_at, test_statistics};
    use super::super::{organize, OrganizerMode, OrganizerParams};
    use super::*;

    fn context_for<'a>(
        members: &'a [RegionParticle],
        statistics: &'a crate::bridge::Statistics,
        now: f64,
    ) -> OrganizeContext<'a> {
        OrganizeContext {
            members,
            statistics,
            field: (800.0, 600.0),
            now,
        }
    }

    #[test]
    fn direct_triggers_one_grain_per_particle() {
        let members = vec![
            member_at(100.0, 100.0, 1.0, 0.0),
            member_at(700.0, 500.0, 0.0, 2.0),
        ];
        let statistics = test_statistics(&members);
        let mut rng = SmallRng::seed_from_u64(1);
        let mut out = Vec::new();
        organize(
            &context_for(&members, &statistics, 0.0),
            OrganizerMode::Direct,
            &OrganizerParams::default(),
            &mut rng,
            &mut out,
        );
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|d| d.trigger));
        // left particle pans left, right particle pans right
        assert!(out[0].pan < 0.0);
        assert!(out[1].pan > 0.0);
        // low y pitches up, high y pitches down, bounded to ±12 semitones
        assert!(out[0].pitch > 0.0 && out[0].pitch <= 12.0);
        assert!(out[1].pitch < 0.0 && out[1].pitch >= -12.0);
    }

    #[test]
    fn clusters_merge_into_bounded_voice_counts() {
        // 20 particles stacked inside the cluster radius plus one far outlier
        let mut members: Vec<RegionParticle> = (0..20)
            .map(|i| member_at(400.0 + (i % 5) as f32, 300.0 + (i / 5) as f32, 1.0, 0.0))
            .collect();
        members.push(member_at(50.0, 50.0, 1.0, 0.0));

        let statistics = test_statistics(&members);
        let mut rng = SmallRng::seed_from_u64(2);
        let mut out = Vec::new();
        organize(
            &context_for(&members, &statistics, 0.0),
            OrganizerMode::ClusteredAmplitude,
            &OrganizerParams::default(),
            &mut rng,
            &mut out,
        );
        // the big cluster emits at most max_cluster_voices descriptors, the outlier
        // falls back to its direct mapping
        assert!(out.len() <= OrganizerParams::default().max_cluster_voices + 1);
        assert!(out.len() >= 2);
        let max_gain = out.iter().map(|d| d.gain).fold(0.0f32, f32::max);
        assert!(max_gain > 0.3);
    }

    #[test]
    fn swarm_score_gates_triggers() {
        // a tight flock moving in lockstep scores high
        let flock: Vec<RegionParticle> = (0..8)
            .map(|i| member_at(400.0 + i as f32 * 5.0, 300.0, 3.0, 0.0))
            .collect();
        let statistics = test_statistics(&flock);
        let mut rng = SmallRng::seed_from_u64(3);
        let mut out = Vec::new();
        organize(
            &context_for(&flock, &statistics, 0.0),
            OrganizerMode::SwarmIntelligence,
            &OrganizerParams::default(),
            &mut rng,
            &mut out,
        );
        assert!(out.iter().filter(|d| d.trigger).count() > 0);

        // a lone particle has no neighbors and never triggers
        let loner = vec![member_at(100.0, 100.0, 3.0, 0.0)];
        let loner_statistics = test_statistics(&loner);
        organize(
            &context_for(&loner, &loner_statistics, 0.0),
            OrganizerMode::SwarmIntelligence,
            &OrganizerParams::default(),
            &mut rng,
            &mut out,
        );
        assert!(out.iter().all(|d| !d.trigger));
    }

    #[test]
    fn harmonic_bands_follow_ratios() {
        let params = OrganizerParams {
            harmonic_ratios: vec![1.0, 2.0],
            harmonic_active: vec![true, false],
            ..Default::default()
        };
        // top band (low y) maps to ratio 1.0, bottom band to ratio 2.0
        let members = vec![
            member_at(400.0, 10.0, 1.0, 0.0),
            member_at(400.0, 590.0, 1.0, 0.0),
        ];
        let statistics = test_statistics(&members);
        let mut rng = SmallRng::seed_from_u64(4);
        let mut out = Vec::new();
        organize(
            &context_for(&members, &statistics, 0.0),
            OrganizerMode::HarmonicLayers,
            &params,
            &mut rng,
            &mut out,
        );
        assert_eq!(out.len(), 2);
        assert!(out[0].trigger);
        assert_eq!(out[0].pitch, 0.0); // ratio 1.0 -> unison
        assert!(!out[1].trigger); // ratio 2.0 is inactive
        assert_eq!(out[1].pitch, 12.0); // but still mapped one octave up
    }

    #[test]
    fn harmonic_mode_degrades_to_unison_without_ratios() {
        // callers may hand over params that never went through clamped()
        let params = OrganizerParams {
            harmonic_ratios: vec![],
            harmonic_active: vec![],
            ..Default::default()
        };
        let members = vec![
            member_at(400.0, 10.0, 1.0, 0.0),
            member_at(400.0, 590.0, 1.0, 0.0),
        ];
        let statistics = test_statistics(&members);
        let mut rng = SmallRng::seed_from_u64(8);
        let mut out = Vec::new();
        organize(
            &context_for(&members, &statistics, 0.0),
            OrganizerMode::HarmonicLayers,
            &params,
            &mut rng,
            &mut out,
        );
        assert_eq!(out.len(), 2);
        for descriptor in &out {
            assert!(descriptor.trigger);
            assert_eq!(descriptor.pitch, 0.0);
        }
    }

    #[test]
    fn rhythmic_grid_gates_triggers_off_grid() {
        let members = vec![member_at(400.0, 300.0, 10.0, 0.0)];
        let statistics = test_statistics(&members);
        let params = OrganizerParams::default(); // 120 bpm, subdivision 4 -> 125 ms steps
        let mut rng = SmallRng::seed_from_u64(5);
        let mut out = Vec::new();

        // exactly on a step boundary: full-speed particle triggers
        organize(
            &context_for(&members, &statistics, 0.5),
            OrganizerMode::RhythmicPatterns,
            &params,
            &mut rng,
            &mut out,
        );
        assert!(out[0].trigger);

        // far from a boundary: gated off regardless of speed
        organize(
            &context_for(&members, &statistics, 0.5625),
            OrganizerMode::RhythmicPatterns,
            &params,
            &mut rng,
            &mut out,
        );
        assert!(!out[0].trigger);
    }

    #[test]
    fn zones_shift_pitch_stepwise() {
        let mut members = vec![
            member_at(400.0, 300.0, 1.0, 0.0),
            member_at(500.0, 300.0, 1.0, 0.0),
        ];
        members[0].zone = 0;
        members[1].zone = 3;
        let statistics = test_statistics(&members);
        let mut rng = SmallRng::seed_from_u64(6);
        let mut out = Vec::new();
        organize(
            &context_for(&members, &statistics, 0.0),
            OrganizerMode::SpatialZones,
            &OrganizerParams::default(),
            &mut rng,
            &mut out,
        );
        assert!(out[1].pitch > out[0].pitch);
        assert!(out[1].rate_multiplier > out[0].rate_multiplier);
    }

    #[test]
    fn chaos_mode_gates_on_threshold_and_speed() {
        let params = OrganizerParams {
            chaos_threshold: 0.9,
            ..Default::default()
        };
        // calm, slow population: no triggers
        let calm: Vec<RegionParticle> =
            (0..4).map(|i| member_at(i as f32 * 10.0, 300.0, 1.0, 0.0)).collect();
        let calm_statistics = test_statistics(&calm);
        let mut rng = SmallRng::seed_from_u64(7);
        let mut out = Vec::new();
        organize(
            &context_for(&calm, &calm_statistics, 0.0),
            OrganizerMode::ChaosModulation,
            &params,
            &mut rng,
            &mut out,
        );
        assert!(out.iter().all(|d| !d.trigger));

        // a fast particle passes the speed gate even in a calm population
        let fast = vec![member_at(400.0, 300.0, 8.0, 0.0)];
        let fast_statistics = test_statistics(&fast);
        organize(
            &context_for(&fast, &fast_statistics, 0.0),
            OrganizerMode::ChaosModulation,
            &params,
            &mut rng,
            &mut out,
        );
        assert!(out[0].trigger);
    }
}
