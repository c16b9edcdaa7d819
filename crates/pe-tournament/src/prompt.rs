use pe_core::Proposal;

/// Builds the Judge's comparison prompt for one ordered pair. Calling this
/// twice with `first`/`second` swapped is how the scheduler runs its
/// double-blind re-evaluation (spec §4.7).
pub fn build_comparison_prompt(first: &Proposal, second: &Proposal) -> String {
    format!(
        "You are judging two competing policy proposals. Identify the stronger one by its exact title.\n\n\
         Proposal A\n\
         Title: {a_title}\n\
         Description: {a_desc}\n\
         Rationale: {a_rationale}\n\
         Implementation notes: {a_notes}\n\n\
         Proposal B\n\
         Title: {b_title}\n\
         Description: {b_desc}\n\
         Rationale: {b_rationale}\n\
         Implementation notes: {b_notes}\n\n\
         Respond with a JSON object containing \"winner_title\" (the exact title of the stronger \
         proposal) and \"rationale\" (one paragraph). If neither proposal is clearly stronger, set \
         \"winner_title\" to an empty string.",
        a_title = first.title,
        a_desc = first.description,
        a_rationale = first.rationale,
        a_notes = first.implementation_notes,
        b_title = second.title,
        b_desc = second.description,
        b_rationale = second.rationale,
        b_notes = second.implementation_notes,
    )
}
