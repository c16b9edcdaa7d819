/// Elo update rule (spec §4.4): Eₐ = 1 / (1 + 10^((R_b - Rₐ)/400)), E_b = 1 - Eₐ.
/// Winner gains K(1 - E_winner); loser loses the same amount — the sum of
/// changes is always zero.
pub fn apply_elo_update(winner_rating: f64, loser_rating: f64, k_factor: f64) -> (f64, f64) {
    let expected_winner = 1.0 / (1.0 + 10f64.powf((loser_rating - winner_rating) / 400.0));
    let delta = k_factor * (1.0 - expected_winner);
    (winner_rating + delta, loser_rating - delta)
}
