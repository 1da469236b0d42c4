use std::{collections::BTreeMap, fmt::Write};

use affiliate_engine::{
    db_types::{Member, PayoutRequest},
    traits::{LedgerPage, PaymentEventOutcome},
    Registration,
    TreeNode,
};
use anyhow::Result;
use prettytable::{
    format::{LinePosition, LineSeparator, TableFormat},
    row,
    Table,
};

fn markdown_format() -> TableFormat {
    prettytable::format::FormatBuilder::new()
        .column_separator('|')
        .borders('|')
        .separator(LinePosition::Title, LineSeparator::new('-', '|', '|', '|'))
        .padding(1, 1)
        .build()
}

fn markdown_style(table: &mut Table) {
    table.set_format(markdown_format());
}

pub fn format_registration(reg: &Registration) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "Member #{} ({}) registered", reg.member.id, reg.member.email)?;
    writeln!(f, "Referral code: {}", reg.member.referral_code)?;
    writeln!(f, "Referral link: {}", reg.referral_link)?;
    writeln!(f, "Currency: {}", reg.member.currency)?;
    match (&reg.sponsor, &reg.placement) {
        (Some(sponsor), Some(placement)) => writeln!(
            f,
            "Sponsor: #{} ({}). Placed on the {} of #{}, {} levels down",
            sponsor.id, sponsor.name, placement.side, placement.parent_id, placement.depth
        )?,
        _ => writeln!(f, "No sponsor. This member is the root of a new tree")?,
    }
    Ok(f)
}

pub fn format_payment_outcome(outcome: &PaymentEventOutcome) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "{}: payment #{} is {}", outcome.code, outcome.payment.id, outcome.payment.status)?;
    if let Some(original) = outcome.original {
        writeln!(f, "This event was processed before, with outcome {original}")?;
    }
    if let Some(member) = &outcome.activated {
        let expires = member.activation_expires_at.map(|t| t.to_string()).unwrap_or_default();
        writeln!(f, "Member #{} activated until {expires}", member.id)?;
    }
    if !outcome.commissions.is_empty() {
        let mut table = Table::new();
        table.set_titles(row!["Level", "Earner", "Percent", "Amount"]);
        for c in &outcome.commissions {
            table.add_row(row![c.level, c.earner_id, c.percent, c.amount]);
        }
        markdown_style(&mut table);
        writeln!(f, "{table}")?;
        writeln!(f, "Total commissions: {}", outcome.total_commissions())?;
    }
    Ok(f)
}

pub fn format_ledger(page: &LedgerPage) -> String {
    if page.entries.is_empty() {
        return "No transactions".to_string();
    }
    let mut table = Table::new();
    table.set_titles(row!["Kind", "Id", "Amount", "Status", "Description", "Date"]);
    for e in &page.entries {
        table.add_row(row![format!("{:?}", e.kind), e.source_id, e.amount, e.status, e.description, e.created_at]);
    }
    markdown_style(&mut table);
    format!("{table}\nShowing {} of {} transactions", page.entries.len(), page.total)
}

pub fn format_tree(root: &TreeNode) -> String {
    let mut out = String::new();
    let mut stack = vec![(root, 0usize, "")];
    while let Some((node, indent, label)) = stack.pop() {
        let _ = writeln!(out, "{:indent$}{label}#{} {} [{}]", "", node.id, node.name, node.status, indent = indent * 2);
        // Right first, so that the left child is printed first
        if let Some(right) = node.right.as_deref() {
            stack.push((right, indent + 1, "R: "));
        }
        if let Some(left) = node.left.as_deref() {
            stack.push((left, indent + 1, "L: "));
        }
    }
    out
}

pub fn format_downline(counts: &BTreeMap<u32, usize>) -> String {
    let mut table = Table::new();
    table.set_titles(row!["Level", "Members"]);
    for (level, count) in counts {
        table.add_row(row![level, count]);
    }
    markdown_style(&mut table);
    format!("{table}\nTotal: {}", counts.values().sum::<usize>())
}

pub fn format_payouts(payouts: &[PayoutRequest]) -> String {
    if payouts.is_empty() {
        return "No payout requests".to_string();
    }
    let mut table = Table::new();
    table.set_titles(row!["Id", "Member", "Amount", "Gateway", "Destination", "Status", "Note", "Created At"]);
    for p in payouts {
        table.add_row(row![
            p.id,
            p.member_id,
            p.amount,
            p.gateway,
            p.destination,
            p.status,
            p.admin_note.as_deref().unwrap_or_default(),
            p.created_at
        ]);
    }
    markdown_style(&mut table);
    table.to_string()
}

pub fn format_members(members: &[Member]) -> String {
    if members.is_empty() {
        return "No members".to_string();
    }
    let mut table = Table::new();
    table.set_titles(row!["Id", "Name", "Email", "Status", "Referral code", "Activation expires"]);
    for m in members {
        let expires = m.activation_expires_at.map(|t| t.to_string()).unwrap_or_default();
        table.add_row(row![m.id, m.name, m.email, m.status, m.referral_code, expires]);
    }
    markdown_style(&mut table);
    table.to_string()
}
