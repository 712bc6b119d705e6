//! Norma 43 (AEB / CSB 43) bank statement reader
//!
//! Fixed-width 80-column records, one per line, identified by the first two
//! characters:
//!
//! | code | record                                  |
//! |------|-----------------------------------------|
//! | `11` | account header                          |
//! | `22` | movement                                |
//! | `23` | free-text concept of the previous `22`  |
//! | `24` | currency equivalence (ignored)          |
//! | `33` | account trailer with counts and totals  |
//! | `88` | end of file                             |
//!
//! A file without an `11` header, or whose first record is not a known code,
//! is rejected as a whole. Anything wrong inside a valid file is reported per
//! line and skipped.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::contracts::norma43_import_v1::{ImportContext, Norma43ImportResult};
use crate::money::{format_spanish_amount, from_minor};
use crate::repos::bank_repo::{BankTransaction, BankTransactionStatus};

const RECORD_WIDTH: usize = 80;
const DEFAULT_DESCRIPTION: &str = "Movimiento bancario";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordCode {
    AccountHeader,
    Movement,
    Concept,
    Equivalence,
    AccountTrailer,
    EndOfFile,
}

impl RecordCode {
    pub fn from_line(line: &str) -> Option<Self> {
        match line.get(0..2)? {
            "11" => Some(RecordCode::AccountHeader),
            "22" => Some(RecordCode::Movement),
            "23" => Some(RecordCode::Concept),
            "24" => Some(RecordCode::Equivalence),
            "33" => Some(RecordCode::AccountTrailer),
            "88" => Some(RecordCode::EndOfFile),
            _ => None,
        }
    }
}

/// One record, space-padded to 80 columns
struct Record {
    chars: Vec<char>,
}

impl Record {
    fn new(line: &str) -> Self {
        let mut chars: Vec<char> = line.chars().collect();
        if chars.len() < RECORD_WIDTH {
            chars.resize(RECORD_WIDTH, ' ');
        }
        Self { chars }
    }

    /// Columns `from..=to`, 1-based as in the bank documentation
    fn field(&self, from: usize, to: usize) -> String {
        self.chars[from - 1..to].iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountHeader {
    pub bank_code: String,
    pub branch_code: String,
    pub account_number: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_balance: Decimal,
    pub currency: String,
    pub account_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovementRecord {
    pub branch_code: String,
    pub operation_date: NaiveDate,
    pub value_date: Option<NaiveDate>,
    pub common_concept: String,
    pub own_concept: String,
    /// Positive for credits, negative for debits
    pub amount: Decimal,
    pub document: String,
    pub reference_1: String,
    pub reference_2: String,
}

/// `YYMMDD`, century 20xx
pub fn parse_yymmdd(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 6 || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year: i32 = raw[0..2].parse().ok()?;
    let month: u32 = raw[2..4].parse().ok()?;
    let day: u32 = raw[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

/// Unsigned amount with two implicit decimals
pub fn parse_implicit_amount(raw: &str) -> Option<Decimal> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    raw.parse::<i64>().ok().map(from_minor)
}

/// Debit/credit key: `1` debit, `2` credit
fn apply_sign(key: &str, magnitude: Decimal) -> Option<Decimal> {
    match key {
        "1" => Some(-magnitude),
        "2" => Some(magnitude),
        _ => None,
    }
}

fn parse_header(record: &Record) -> Result<AccountHeader, String> {
    let start = record.field(21, 26);
    let end = record.field(27, 32);
    let balance = parse_implicit_amount(&record.field(34, 47))
        .ok_or_else(|| "saldo inicial no válido en la cabecera".to_string())?;

    Ok(AccountHeader {
        bank_code: record.field(3, 6),
        branch_code: record.field(7, 10),
        account_number: record.field(11, 20),
        start_date: parse_yymmdd(&start)
            .ok_or_else(|| format!("fecha inicial no válida '{}'", start))?,
        end_date: parse_yymmdd(&end).ok_or_else(|| format!("fecha final no válida '{}'", end))?,
        initial_balance: apply_sign(&record.field(33, 33), balance)
            .ok_or_else(|| "signo del saldo inicial no válido".to_string())?,
        currency: record.field(48, 50),
        account_name: record.field(52, 77).trim().to_string(),
    })
}

fn parse_movement(record: &Record) -> Result<MovementRecord, String> {
    let operation = record.field(11, 16);
    let operation_date = parse_yymmdd(&operation)
        .ok_or_else(|| format!("fecha de operación no válida '{}'", operation))?;

    let value = record.field(17, 22);
    let value_date = if value.trim().is_empty() {
        None
    } else {
        Some(parse_yymmdd(&value).ok_or_else(|| format!("fecha valor no válida '{}'", value))?)
    };

    let raw_amount = record.field(29, 42);
    let magnitude = parse_implicit_amount(&raw_amount)
        .ok_or_else(|| format!("importe no válido '{}'", raw_amount.trim()))?;

    let key = record.field(28, 28);
    let amount = apply_sign(&key, magnitude)
        .ok_or_else(|| format!("clave debe/haber no válida '{}'", key))?;

    Ok(MovementRecord {
        branch_code: record.field(7, 10),
        operation_date,
        value_date,
        common_concept: record.field(23, 24),
        own_concept: record.field(25, 27),
        amount,
        document: record.field(43, 52).trim().to_string(),
        reference_1: record.field(53, 64).trim().to_string(),
        reference_2: record.field(65, 80).trim().to_string(),
    })
}

fn concept_text(record: &Record) -> String {
    [record.field(5, 42), record.field(43, 80)]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_meaningful(value: &str) -> bool {
    !value.is_empty() && !value.chars().all(|c| c == '0')
}

fn to_transaction(
    movement: &MovementRecord,
    context: &ImportContext,
    import_batch_id: Uuid,
) -> BankTransaction {
    let description = [movement.reference_1.as_str(), movement.reference_2.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    let reference = [movement.document.as_str(), movement.reference_1.as_str()]
        .into_iter()
        .find(|s| is_meaningful(s))
        .map(str::to_string);

    BankTransaction {
        id: Uuid::new_v4(),
        bank_account_id: context.bank_account_id.clone(),
        centro_code: context.centro_code.clone(),
        transaction_date: movement.operation_date,
        value_date: movement.value_date,
        description,
        reference,
        amount: movement.amount,
        status: BankTransactionStatus::Pending,
        import_batch_id,
    }
}

/// Running totals of the account currently being read
#[derive(Debug, Default)]
struct AccountTotals {
    debit_count: u64,
    debit_total: Decimal,
    credit_count: u64,
    credit_total: Decimal,
}

impl AccountTotals {
    fn add(&mut self, amount: Decimal) {
        if amount.is_sign_negative() {
            self.debit_count += 1;
            self.debit_total += -amount;
        } else {
            self.credit_count += 1;
            self.credit_total += amount;
        }
    }

    /// Compare against a `33` trailer, returning one message per mismatch
    fn check_trailer(&self, record: &Record) -> Vec<String> {
        let declared_count = |from, to| record.field(from, to).trim().parse::<u64>().ok();
        let mut mismatches = Vec::new();

        let sides = [
            ("debe", declared_count(21, 25), parse_implicit_amount(&record.field(26, 39)), self.debit_count, self.debit_total),
            ("haber", declared_count(40, 44), parse_implicit_amount(&record.field(45, 58)), self.credit_count, self.credit_total),
        ];
        for (side, count, total, read_count, read_total) in sides {
            match (count, total) {
                (Some(count), Some(total)) => {
                    if count != read_count || total != read_total {
                        mismatches.push(format!(
                            "el registro 33 declara {} apuntes al {} por {} y se han leído {} por {}",
                            count,
                            side,
                            format_spanish_amount(total),
                            read_count,
                            format_spanish_amount(read_total)
                        ));
                    }
                }
                _ => mismatches.push(format!("totales al {} ilegibles en el registro 33", side)),
            }
        }
        mismatches
    }
}

/// What the previous record was, for attaching `23` concepts
enum Previous {
    Movement(usize),
    SkippedMovement,
    Other,
}

/// Parse a Norma 43 statement
///
/// Pure: the same text always yields the same transactions and totals; only
/// the generated ids depend on `import_batch_id` and fresh UUIDs.
pub fn parse_norma43(
    content: &str,
    context: &ImportContext,
    import_batch_id: Uuid,
) -> Norma43ImportResult {
    let invalid = || Norma43ImportResult::invalid_format(import_batch_id, context.file_name.clone());

    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();

    match lines.first() {
        Some((_, first)) if RecordCode::from_line(first).is_some() => {}
        _ => return invalid(),
    }

    let mut saw_header = false;
    let mut finished = false;
    let mut previous = Previous::Other;
    let mut totals = AccountTotals::default();
    let mut transactions: Vec<BankTransaction> = Vec::new();
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    for (line_no, raw) in lines {
        if finished {
            warnings.push(format!("Línea {}: contenido posterior al registro 88 ignorado", line_no));
            continue;
        }

        let record = Record::new(raw);
        let Some(code) = RecordCode::from_line(raw) else {
            errors.push(format!(
                "Línea {}: tipo de registro desconocido '{}'",
                line_no,
                record.field(1, 2)
            ));
            previous = Previous::Other;
            continue;
        };

        match code {
            RecordCode::AccountHeader => {
                saw_header = true;
                totals = AccountTotals::default();
                match parse_header(&record) {
                    Ok(header) => tracing::debug!(
                        bank_code = %header.bank_code,
                        account_number = %header.account_number,
                        start = %header.start_date,
                        end = %header.end_date,
                        "Norma 43 account header"
                    ),
                    Err(msg) => warnings.push(format!("Línea {}: {}", line_no, msg)),
                }
                previous = Previous::Other;
            }
            RecordCode::Movement => {
                if !saw_header {
                    errors.push(format!(
                        "Línea {}: movimiento anterior a la cabecera de cuenta",
                        line_no
                    ));
                    previous = Previous::SkippedMovement;
                    continue;
                }
                match parse_movement(&record) {
                    Ok(movement) => {
                        totals.add(movement.amount);
                        transactions.push(to_transaction(&movement, context, import_batch_id));
                        previous = Previous::Movement(transactions.len() - 1);
                    }
                    Err(msg) => {
                        errors.push(format!("Línea {}: {}", line_no, msg));
                        previous = Previous::SkippedMovement;
                    }
                }
            }
            RecordCode::Concept => match previous {
                Previous::Movement(idx) => {
                    let text = concept_text(&record);
                    if let Some(tx) = transactions.get_mut(idx) {
                        if !text.is_empty() {
                            if !tx.description.is_empty() {
                                tx.description.push(' ');
                            }
                            tx.description.push_str(&text);
                        }
                    }
                }
                Previous::SkippedMovement => {}
                Previous::Other => errors.push(format!(
                    "Línea {}: registro 23 sin movimiento previo",
                    line_no
                )),
            },
            RecordCode::Equivalence => {}
            RecordCode::AccountTrailer => {
                for mismatch in totals.check_trailer(&record) {
                    warnings.push(format!("Línea {}: {}", line_no, mismatch));
                }
                previous = Previous::Other;
            }
            RecordCode::EndOfFile => {
                finished = true;
                previous = Previous::Other;
            }
        }
    }

    if !saw_header {
        return invalid();
    }

    for tx in transactions.iter_mut().filter(|t| t.description.is_empty()) {
        tx.description = DEFAULT_DESCRIPTION.to_string();
    }

    let total_credits: Decimal = transactions
        .iter()
        .filter(|t| t.amount > Decimal::ZERO)
        .map(|t| t.amount)
        .sum();
    let total_debits: Decimal = transactions
        .iter()
        .filter(|t| t.amount < Decimal::ZERO)
        .map(|t| -t.amount)
        .sum();

    Norma43ImportResult {
        success: true,
        transactions_imported: transactions.len(),
        transactions,
        total_credits,
        total_debits,
        errors,
        warnings,
        import_batch_id,
        file_name: context.file_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::norma43_import_v1::INVALID_FORMAT_MESSAGE;

    fn ctx() -> ImportContext {
        ImportContext {
            bank_account_id: "ba-1".to_string(),
            centro_code: "C001".to_string(),
            file_name: Some("extracto.n43".to_string()),
        }
    }

    fn header() -> String {
        format!(
            "11{}{}{}{}{}{}{:014}{}{}{:<26}{}",
            "2100", "0418", "0200051332", "240101", "240131", "2", 100000, "978", "3", "RESTAURANTE CENTRO", "   "
        )
    }

    fn movement(date: &str, key: char, minor: i64, ref1: &str, ref2: &str) -> String {
        format!(
            "22    0418{}{}02000{}{:014}{:010}{:<12}{:<16}",
            date, date, key, minor, 0, ref1, ref2
        )
    }

    fn concept(text_a: &str, text_b: &str) -> String {
        format!("2301{:<38}{:<38}", text_a, text_b)
    }

    fn trailer(debits: (u32, i64), credits: (u32, i64)) -> String {
        format!(
            "33210004180200051332{:05}{:014}{:05}{:014}2{:014}978    ",
            debits.0, debits.1, credits.0, credits.1, 150000
        )
    }

    fn end_of_file(records: u32) -> String {
        format!("88{}{:06}{:<54}", "9".repeat(18), records, "")
    }

    #[test]
    fn test_builders_produce_80_columns() {
        assert_eq!(header().len(), 80);
        assert_eq!(movement("240115", '2', 1, "", "").len(), 80);
        assert_eq!(concept("a", "b").len(), 80);
        assert_eq!(trailer((0, 0), (0, 0)).len(), 80);
        assert_eq!(end_of_file(1).len(), 80);
    }

    #[test]
    fn test_movement_fields_and_signs() {
        let text = [
            header(),
            movement("240115", '2', 10000, "TPV", "VENTAS"),
            movement("240116", '1', 5000, "", ""),
            end_of_file(4),
        ]
        .join("\n");
        let result = parse_norma43(&text, &ctx(), Uuid::nil());

        assert!(result.success);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.transactions.len(), 2);

        let credit = &result.transactions[0];
        assert_eq!(credit.amount, Decimal::new(10000, 2));
        assert_eq!(credit.transaction_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(credit.value_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(credit.description, "TPV VENTAS");
        assert_eq!(credit.reference.as_deref(), Some("TPV"));
        assert_eq!(credit.status, BankTransactionStatus::Pending);
        assert_eq!(credit.bank_account_id, "ba-1");

        let debit = &result.transactions[1];
        assert_eq!(debit.amount, Decimal::new(-5000, 2));
        assert_eq!(debit.description, DEFAULT_DESCRIPTION);
        assert_eq!(debit.reference, None);
    }

    #[test]
    fn test_concept_records_append_to_description() {
        let text = [
            header(),
            movement("240115", '1', 2500, "RECIBO", ""),
            concept("SUMINISTRO ELECTRICO", "ENERO"),
            concept("CUPS ES0021", ""),
            "88".to_string(),
        ]
        .join("\r\n");
        let result = parse_norma43(&text, &ctx(), Uuid::nil());
        assert_eq!(
            result.transactions[0].description,
            "RECIBO SUMINISTRO ELECTRICO ENERO CUPS ES0021"
        );
    }

    #[test]
    fn test_orphan_concept_and_unknown_record_are_errors() {
        let text = [
            header(),
            concept("HUERFANO", ""),
            "99 registro raro".to_string(),
            movement("240115", '2', 100, "", ""),
        ]
        .join("\n");
        let result = parse_norma43(&text, &ctx(), Uuid::nil());
        assert!(result.success);
        assert_eq!(result.transactions_imported, 1);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].starts_with("Línea 2:"));
        assert!(result.errors[1].contains("'99'"));
    }

    #[test]
    fn test_malformed_movement_is_skipped_with_its_concepts() {
        let mut bad = movement("241341", '2', 100, "", "");
        bad.replace_range(10..16, "24AB01");
        let text = [
            header(),
            bad,
            concept("DEL MOVIMIENTO MALO", ""),
            movement("240120", '3', 100, "", ""),
            movement("240121", '2', 700, "", ""),
        ]
        .join("\n");
        let result = parse_norma43(&text, &ctx(), Uuid::nil());

        assert!(result.success);
        assert_eq!(result.transactions_imported, 1);
        assert_eq!(result.errors.len(), 2, "{:?}", result.errors);
        assert!(result.errors[0].contains("fecha de operación"));
        assert!(result.errors[1].contains("clave debe/haber"));
        assert_eq!(result.total_credits, Decimal::new(700, 2));
    }

    #[test]
    fn test_trailer_mismatch_is_a_warning() {
        let text = [
            header(),
            movement("240115", '2', 10000, "", ""),
            movement("240116", '1', 5000, "", ""),
            trailer((1, 5000), (2, 10000)),
            end_of_file(5),
        ]
        .join("\n");
        let result = parse_norma43(&text, &ctx(), Uuid::nil());
        assert!(result.success);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("haber"));
    }

    #[test]
    fn test_matching_trailer_has_no_warnings() {
        let text = [
            header(),
            movement("240115", '2', 10000, "", ""),
            movement("240116", '1', 5000, "", ""),
            trailer((1, 5000), (1, 10000)),
            end_of_file(5),
        ]
        .join("\n");
        assert!(parse_norma43(&text, &ctx(), Uuid::nil()).warnings.is_empty());
    }

    #[test]
    fn test_missing_header_is_invalid() {
        let text = [movement("240115", '2', 100, "", ""), end_of_file(1)].join("\n");
        let result = parse_norma43(&text, &ctx(), Uuid::nil());
        assert!(!result.success);
        assert_eq!(result.errors, vec![INVALID_FORMAT_MESSAGE.to_string()]);
        assert!(result.transactions.is_empty());
    }

    #[test]
    fn test_empty_file_is_invalid() {
        assert!(!parse_norma43("", &ctx(), Uuid::nil()).success);
        assert!(!parse_norma43("\n  \n", &ctx(), Uuid::nil()).success);
    }

    #[test]
    fn test_header_only_file_succeeds_empty() {
        let text = [header(), end_of_file(1)].join("\n");
        let result = parse_norma43(&text, &ctx(), Uuid::nil());
        assert!(result.success);
        assert_eq!(result.transactions_imported, 0);
        assert_eq!(result.total_credits, Decimal::ZERO);
    }

    #[test]
    fn test_content_after_end_of_file_is_ignored() {
        let text = [header(), end_of_file(1), movement("240115", '2', 100, "", "")].join("\n");
        let result = parse_norma43(&text, &ctx(), Uuid::nil());
        assert_eq!(result.transactions_imported, 0);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_yymmdd("240229"), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(parse_yymmdd("230229"), None);
        assert_eq!(parse_yymmdd("2402"), None);
        assert_eq!(parse_implicit_amount("00000000012345"), Some(Decimal::new(12345, 2)));
        assert_eq!(parse_implicit_amount("0000000001234 "), None);
    }
}
