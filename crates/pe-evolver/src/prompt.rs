use pe_core::Proposal;

/// Builds the Evolver's Worker prompt: asks for an improved variant of
/// `proposal` that preserves its core intent and enumerates what changed
/// (spec §4.8).
pub fn build_improvement_prompt(proposal: &Proposal) -> String {
    format!(
        "You are improving an existing policy proposal while preserving its core intent.\n\n\
         Current proposal\n\
         Title: {title}\n\
         Description: {description}\n\
         Rationale: {rationale}\n\
         Implementation notes: {notes}\n\n\
         Produce an improved variant as a JSON object with string fields \"title\", \"description\", \
         \"rationale\", \"implementation_notes\", and an array field \"deltas\" listing each concrete \
         change you made relative to the current proposal. Respond with only the JSON object.",
        title = proposal.title,
        description = proposal.description,
        rationale = proposal.rationale,
        notes = proposal.implementation_notes,
    )
}
