use pe_context::ContextBundle;

/// Builds the Generator's Worker prompt from an assembled context bundle.
/// `amplified` adds the diversity instruction used on the one permitted
/// retry when the first pass under-produces (spec §4.6).
pub fn build_prompt(bundle: &ContextBundle, n: usize, amplified: bool) -> String {
    let mut fields = bundle
        .jurisdiction
        .iter()
        .map(|(k, v)| format!("- {k}: {}", v.value()))
        .collect::<Vec<_>>();
    fields.sort();
    let jurisdiction_block = if fields.is_empty() {
        "(no jurisdictional profile supplied)".to_string()
    } else {
        fields.join("\n")
    };

    let research_block = if bundle.research.hits.is_empty() {
        "(no research hits available)".to_string()
    } else {
        bundle
            .research
            .hits
            .iter()
            .map(|h| format!("- {} ({})", h.snippet, h.url))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let diversity_note = if amplified {
        "\nThe previous attempt produced too few usable proposals. Generate proposals that differ \
         sharply from one another in mechanism and scope (e.g. regulatory ban, market incentive, \
         public-private partnership, phased pilot) rather than variations on one idea.\n"
    } else {
        ""
    };

    format!(
        "You are generating candidate local-government policy proposals.\n\n\
         Policy question: {query}\n\n\
         Jurisdiction profile:\n{jurisdiction_block}\n\n\
         Research summary: {summary}\n{research_block}\n{diversity_note}\n\
         Produce exactly {n} distinct proposals as a JSON array. Each element must be an object with \
         string fields \"title\", \"description\", \"rationale\", and \"implementation_notes\". \
         Respond with only the JSON array.",
        query = bundle.query.text,
        summary = bundle.research.summary,
        n = n,
    )
}
