//! Aggregations over the ledger

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::entity::transaction::{self, TransactionType};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Totals {
    pub income: Decimal,
    pub expense: Decimal,
    pub profit: Decimal,
}

impl Totals {
    fn add(&mut self, t: &transaction::Model) {
        match t.kind {
            TransactionType::Income => self.income += t.amount,
            TransactionType::Expense => self.expense += t.amount,
        }
        self.profit = self.income - self.expense;
    }

    pub fn of<'a>(rows: impl IntoIterator<Item = &'a transaction::Model>) -> Self {
        let mut totals = Totals::default();
        for row in rows {
            totals.add(row);
        }
        totals
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthTotals {
    /// `YYYY-MM`
    pub month: String,
    #[serde(flatten)]
    pub totals: Totals,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DayTotals {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub totals: Totals,
}

/// First day of the month `back` months before the month of `date`
pub fn month_start_back(date: NaiveDate, back: u32) -> NaiveDate {
    let index = date.year() * 12 + date.month0() as i32 - back as i32;
    let (year, month0) = (index.div_euclid(12), index.rem_euclid(12) as u32);
    NaiveDate::from_ymd_opt(year, month0 + 1, 1).unwrap_or(date)
}

pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Totals of the last `months` months including the current one, oldest first
pub fn monthly(rows: &[transaction::Model], now: DateTime<Utc>, months: u32) -> Vec<MonthTotals> {
    let today = now.date_naive();
    let mut buckets: BTreeMap<String, Totals> = (0..months)
        .map(|back| (month_key(month_start_back(today, back)), Totals::default()))
        .collect();

    for row in rows {
        if let Some(bucket) = buckets.get_mut(&month_key(row.created_at.date_naive())) {
            bucket.add(row);
        }
    }

    buckets
        .into_iter()
        .map(|(month, totals)| MonthTotals { month, totals })
        .collect()
}

/// Day-by-day totals for the last `days` days ending today, zero-filled
pub fn daily(rows: &[transaction::Model], now: DateTime<Utc>, days: u32) -> Vec<DayTotals> {
    let today = now.date_naive();
    let first = today - Duration::days(days.saturating_sub(1) as i64);
    let mut buckets: BTreeMap<NaiveDate, Totals> = first
        .iter_days()
        .take(days as usize)
        .map(|day| (day, Totals::default()))
        .collect();

    for row in rows {
        if let Some(bucket) = buckets.get_mut(&row.created_at.date_naive()) {
            bucket.add(row);
        }
    }

    buckets
        .into_iter()
        .map(|(date, totals)| DayTotals { date, totals })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Salaries,
    Rent,
    Materials,
    Transport,
    Other,
}

impl ExpenseCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            ExpenseCategory::Salaries => "Salaries",
            ExpenseCategory::Rent => "Rent",
            ExpenseCategory::Materials => "Materials",
            ExpenseCategory::Transport => "Transport",
            ExpenseCategory::Other => "Other",
        }
    }
}

const CATEGORY_KEYWORDS: &[(ExpenseCategory, &[&str])] = &[
    (ExpenseCategory::Salaries, &["salary", "payroll", "payment"]),
    (ExpenseCategory::Rent, &["rent"]),
    (ExpenseCategory::Materials, &["material", "equipment"]),
    (ExpenseCategory::Transport, &["transport", "fuel", "gas"]),
];

/// Guess the category of an expense from its description
pub fn categorize_expense(description: &str) -> ExpenseCategory {
    let text = description.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(category, _)| *category)
        .unwrap_or(ExpenseCategory::Other)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryAmount {
    pub category: ExpenseCategory,
    pub name: String,
    pub amount: Decimal,
}

/// Expense totals per category, empty categories dropped
pub fn expense_categories(rows: &[transaction::Model]) -> Vec<CategoryAmount> {
    let mut sums: BTreeMap<ExpenseCategory, Decimal> = BTreeMap::new();
    for row in rows.iter().filter(|t| t.kind == TransactionType::Expense) {
        *sums.entry(categorize_expense(&row.description)).or_default() += row.amount;
    }
    sums.into_iter()
        .filter(|(_, amount)| !amount.is_zero())
        .map(|(category, amount)| CategoryAmount {
            category,
            name: category.display_name().to_string(),
            amount,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tx(kind: TransactionType, amount: i64, description: &str, at: DateTime<Utc>) -> transaction::Model {
        transaction::Model {
            id: 0,
            kind,
            amount: Decimal::from(amount),
            description: description.to_string(),
            order_id: None,
            created_at: at,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_month_start_back_crosses_year() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 17).unwrap();
        assert_eq!(month_start_back(date, 0), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(month_start_back(date, 2), NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(month_start_back(date, 14), NaiveDate::from_ymd_opt(2022, 12, 1).unwrap());
    }

    #[test]
    fn test_monthly_buckets() {
        let rows = vec![
            tx(TransactionType::Income, 1000, "", at(2024, 2, 5)),
            tx(TransactionType::Expense, 300, "", at(2024, 2, 6)),
            tx(TransactionType::Income, 500, "", at(2023, 12, 31)),
            tx(TransactionType::Income, 999, "", at(2023, 6, 1)),
        ];

        let months = monthly(&rows, at(2024, 2, 20), 6);

        assert_eq!(months.len(), 6);
        assert_eq!(months[0].month, "2023-09");
        assert_eq!(months[5].month, "2024-02");
        assert_eq!(months[5].totals.profit, Decimal::from(700));
        assert_eq!(months[3].totals.income, Decimal::from(500));
        assert!(months.iter().all(|m| m.totals.income != Decimal::from(999)));
    }

    #[test]
    fn test_daily_is_zero_filled() {
        let rows = vec![tx(TransactionType::Income, 100, "", at(2024, 3, 10))];

        let days = daily(&rows, at(2024, 3, 10), 30);

        assert_eq!(days.len(), 30);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());
        assert_eq!(days[29].totals.income, Decimal::from(100));
        assert_eq!(days[28].totals, Totals::default());
    }

    #[test]
    fn test_categorize_expense() {
        assert_eq!(categorize_expense("Salary payment for Ivan"), ExpenseCategory::Salaries);
        assert_eq!(categorize_expense("Office RENT March"), ExpenseCategory::Rent);
        assert_eq!(categorize_expense("Cost of materials for order #4"), ExpenseCategory::Materials);
        assert_eq!(categorize_expense("Fuel for the van"), ExpenseCategory::Transport);
        assert_eq!(categorize_expense("Coffee"), ExpenseCategory::Other);
    }

    #[test]
    fn test_expense_categories_skip_income_and_empty() {
        let now = at(2024, 3, 1);
        let rows = vec![
            tx(TransactionType::Expense, 200, "fuel", now),
            tx(TransactionType::Expense, 50, "gas station", now),
            tx(TransactionType::Income, 1000, "salary refund", now),
            tx(TransactionType::Expense, 0, "rent", now),
        ];

        let categories = expense_categories(&rows);

        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].category, ExpenseCategory::Transport);
        assert_eq!(categories[0].amount, Decimal::from(250));
    }
}
